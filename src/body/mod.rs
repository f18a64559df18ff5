//! Request body subsystem.
//!
//! # Data Flow
//! ```text
//! hyper body stream + content-length
//!     → reader.rs (size checks, frame accumulation, connection destroy)
//!     → raw Bytes
//!     → decoder.rs (JSON / URL-encoded / multipart by content type)
//!     → multipart.rs (byte scanner, zero-copy file slices)
//!     → DecodedBody { body, files }
//! ```
//!
//! # Design Decisions
//! - No body is read unless a positive content-length is declared
//! - Decoding is a pure function over the collected bytes
//! - Multipart parsing never decodes file payloads as text

pub mod decoder;
pub mod multipart;
pub mod reader;

pub use decoder::{decode, DecodedBody};
pub use multipart::UploadedFile;
pub use reader::BodyReader;
