tonic::include_proto!("workerpool");

mod convert;

pub use convert::WireError;
