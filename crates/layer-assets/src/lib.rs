//! layer-assets: incremental asset generation for layered documents
//!
//! Layers whose names describe build targets ("components") get an artifact
//! rendered and written for each target. As the document changes, this crate:
//! - re-derives which layers encode which components
//! - issues an asynchronous render per component
//! - places finished renders at their destinations
//! - cancels or discards work made obsolete by newer document state
//!
//! The naming grammar, the renderer, the filesystem and the document itself
//! are collaborators behind the [`NameAnalyzer`], [`RenderEngine`],
//! [`AssetFiles`] and [`Document`] traits. [`AssetManager`] ties them together
//! and is driven through [`AssetManager::resume`] and [`AssetManager::pause`].

pub mod analyzer;
pub mod component;
pub mod config;
mod controller;
pub mod diff;
pub mod document;
pub mod error;
pub mod files;
pub mod manager;
pub mod memory;
pub mod placement;
pub mod registry;
pub mod render;

pub use analyzer::{AnalysisError, AnalysisResult, NameAnalyzer};
pub use component::{Component, ComponentId};
pub use config::AssetsConfig;
pub use document::{
    ChangeKind, ChangeSubscription, Document, DocumentChange, DocumentId, Layer, LayerChange,
    LayerId,
};
pub use error::{Error, Result};
pub use files::{AssetFiles, FsAssetFiles};
pub use manager::AssetManager;
pub use memory::InMemoryDocument;
pub use registry::ComponentRegistry;
pub use render::{RenderEngine, RenderError, RenderRequest, RenderResult, RenderState};
