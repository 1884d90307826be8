//! Architecture support
//!
//! Only x86_64 is implemented. Its data layouts and validation logic build on
//! every host so they can be unit tested; the instruction-level primitives
//! inside [`x86_64::cpu`] are compiled for bare-metal x86_64 only.

pub mod x86_64;
