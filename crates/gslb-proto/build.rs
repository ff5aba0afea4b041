fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Use the vendored protoc so the build does not depend on the host
    std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);

    tonic_build::configure()
        .build_server(false)
        .build_client(true)
        .compile_protos(&["proto/gslbi.proto"], &["proto"])?;

    println!("cargo:rerun-if-changed=proto/gslbi.proto");

    Ok(())
}
