#![deny(missing_docs)]
#![doc = include_str!("../README.md")]

mod delta;
mod derived;
mod diff;
mod document;
mod error;
mod matcher;
mod path;
pub mod reactive;
mod source;
mod view;

pub use delta::{ArrayKey, Delta, ARRAY_MARKER, ARRAY_MARKER_KEY};
pub use derived::DerivedDocument;
pub use diff::{diff, diff_entry, patch, update_value};
pub use document::{Document, DocumentBuilder, MutationOp, UnsafeMutation, VALUE_KEY};
pub use error::{DocError, DocResult};
pub use matcher::{changes_keys, delta_at, keys_changed_at, patch_has, patch_has_dotted, prefix};
pub use path::{Path, Seg};
pub use source::{json_cell, SourceDocument};
pub use view::{Node, View};
