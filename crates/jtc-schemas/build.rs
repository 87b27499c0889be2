//! ---
//! jtc_section: "02-wire-protocol"
//! jtc_subsection: "build"
//! jtc_type: "source"
//! jtc_scope: "code"
//! jtc_description: "Compiles the telemetry and login protobuf definitions."
//! jtc_version: "v0.1.0"
//! jtc_owner: "tbd"
//! ---
fn main() {
    let protoc = protoc_bin_vendored::protoc_bin_path().expect("failed to locate protoc");
    std::env::set_var("PROTOC", protoc);

    println!("cargo:rerun-if-changed=proto/telemetry/oc.proto");
    println!("cargo:rerun-if-changed=proto/authentication/authentication_service.proto");
    println!("cargo:rerun-if-changed=proto");

    // Server stubs are only consumed by the in-process fake device used in tests.
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile(
            &[
                "proto/telemetry/oc.proto",
                "proto/authentication/authentication_service.proto",
            ],
            &["proto"],
        )
        .expect("failed to compile gRPC definitions");
}
