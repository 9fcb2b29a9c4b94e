fn main() {
    println!("cargo:rerun-if-changed=./workerpool.proto");
    tonic_build::compile_protos("./workerpool.proto")
        .unwrap_or_else(|err| panic!("Failed to compile protos {:?}", err));
}
