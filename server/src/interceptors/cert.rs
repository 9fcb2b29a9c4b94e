use tonic::{Request, Status};
use x509_parser::{certificate::X509Certificate, traits::FromDer};

/// The authenticated peer of a request, taken from its client certificate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerIdentity {
    pub common_name: String,
}

/// A tonic interceptor service function.
///
/// Extracts the subject common name from the client certificate and adds it to the request
/// extensions. Plaintext connections carry no certificate and pass through untouched.
pub fn extract_peer_identity(mut req: Request<()>) -> Result<Request<()>, Status> {
    let client_certs = match req.peer_certs() {
        Some(certs) => certs,
        None => return Ok(req),
    };
    let der = client_certs
        .first()
        .ok_or_else(|| Status::unauthenticated("Request missing client cert"))?
        .get_ref(); // rustls hands the cert over as DER

    let (rem, cert) =
        X509Certificate::from_der(der).map_err(|_| Status::unauthenticated("Bad client cert"))?;
    if !rem.is_empty() {
        return Err(Status::unauthenticated("Bad client cert"));
    }
    let common_name = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .ok_or_else(|| Status::unauthenticated("Client cert missing subject common name"))?
        .to_string();

    req.extensions_mut().insert(PeerIdentity { common_name });
    Ok(req)
}

/// Who sent `req`, for logging.
pub fn peer_name<T>(req: &Request<T>) -> String {
    match req.extensions().get::<PeerIdentity>() {
        Some(peer) => peer.common_name.clone(),
        None => req
            .remote_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| "unknown".to_string()),
    }
}
