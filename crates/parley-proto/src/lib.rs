//! Generated protobuf/gRPC code from `proto/parley.proto`.
//!
//! The raw byte encoding is prost's concern; everything in this crate
//! is generated at build time. The descriptor set feeds the server's
//! reflection service so tooling clients can introspect the schema.

tonic::include_proto!("parley");

/// Encoded file descriptor set for gRPC reflection.
pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("parley_descriptor");
