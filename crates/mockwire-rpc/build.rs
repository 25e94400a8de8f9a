//! Compiles `proto/mock.proto` into messages, client, server and a descriptor set.

use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let out_dir = PathBuf::from(std::env::var("OUT_DIR")?);
    let mut config = prost_build::Config::new();
    let _ = config.protoc_executable(protoc_bin_vendored::protoc_bin_path()?);

    tonic_build::configure()
        .file_descriptor_set_path(out_dir.join("mock_descriptor.bin"))
        .compile_protos_with_config(config, &["proto/mock.proto"], &["proto"])?;
    println!("cargo:rerun-if-changed=proto/mock.proto");
    Ok(())
}
