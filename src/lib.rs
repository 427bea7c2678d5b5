//! Collective writes of rank-partitioned arrays into a single shared file.
//!
//! A fixed group of workers jointly populates one dataset. Each worker contributes a contiguous,
//! non-overlapping run of rows; the whole group writes every run in one collective operation.
//!
//! # Features
//!
//! - **Layout resolution**: derive the global extent and each worker's offset from a contribution
//!   size function every worker can evaluate, or by exchanging local sizes ([`layout`])
//! - **Hyperslab selection**: address a run of rows of a declared shape ([`selection`])
//! - **Array store**: a single file holding typed, shaped datasets and their attributes ([`store`],
//!   [`attribute`])
//! - **Collective writer**: the whole protocol, from file creation to the collective write
//!   ([`writer`])
//! - **Group runtimes**: processes over shared memory, threads, or a single worker ([`group`])
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use simple_pario::group::{Communicator, World};
//! use simple_pario::writer::CollectiveWriter;
//!
//! // Initialize the group with 4 processes
//! let world = World::init(4).unwrap();
//!
//! // Rank r contributes r + 1 copies of its rank
//! let local = vec![world.rank() as i32; world.rank() + 1];
//! CollectiveWriter::new("stuff.pario", "ranks")
//!     .write(&world, &local, |rank| rank as i64 + 1)
//!     .unwrap();
//!
//! world.finalize().unwrap();
//! ```
//!
//! # Error Handling
//!
//! All operations return a `Result` type with detailed error variants through [`Error`].
//! Errors are not recoverable for the worker that meets them. A worker that fails after the
//! dataset has been created leaves it valid but incomplete.

pub mod attribute;
pub mod config;
pub mod datatype;
pub mod error;
pub mod group;
pub mod layout;
pub mod rawio;
pub mod selection;
pub mod store;
pub mod writer;

pub use datatype::{DataType, Element};
pub use error::{Error, Result};
pub use group::{Communicator, CommunicatorExt};
pub use layout::Layout;
pub use selection::{Dataspace, Hyperslab};
pub use writer::CollectiveWriter;
