//! # Retouch
//!
//! Apply named, parameterised transformations to an in-memory raster with
//! bounded undo/redo and rollback of failed transformations.
//!
//! ## Core Pieces
//!
//! - **Operations**: pure image transformations behind the [`ImageOperation`] trait
//! - **Resolver**: turns an operation tag and a loosely typed parameter bag into a validated [`Operation`]
//! - **Session**: the history coordinator; snapshot, attempt, then commit or roll back
//! - **Harness**: runs sessions off the caller's task with per-session ordering and a bounded worker pool
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use retouch::{Harness, HarnessConfig, bag};
//! use serde_json::json;
//!
//! # async fn demo(image: retouch::Image) -> retouch::Result<()> {
//! let harness = Harness::new(HarnessConfig::default())?;
//! let session = harness.open_session(image);
//!
//! let rotated = session.apply("rotate", &bag(json!({ "angle": "90" }))).await?;
//! println!("now {}x{}", rotated.width(), rotated.height());
//!
//! session.undo().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Synchronous Use
//!
//! ```rust
//! use retouch::{Session, resolve, bag, Image};
//! use serde_json::json;
//!
//! let mut session = Session::new(Image::new(300, 300));
//! let crop = resolve("crop", &bag(json!({ "x": 100, "y": 100, "width": 200, "height": 200 })))?;
//! session.apply(&crop)?;
//! assert!(session.can_undo());
//! # Ok::<(), retouch::RetouchError>(())
//! ```

pub mod editor;
pub mod error;
pub mod harness;
pub mod history;
pub mod operations;
pub mod resolver;
pub mod traits;
pub mod types;

pub use editor::Editor;
pub use error::{ProcessingErrorKind, Result, RetouchError};
pub use harness::{Completion, Harness, HarnessConfig, SessionHandle, SessionStatus, Ticket};
pub use history::{HistoryEntry, HistoryView, MAX_HISTORY, Session, SessionState};
pub use operations::*;
pub use resolver::{OperationKind, resolve};
pub use traits::*;
pub use types::*;
