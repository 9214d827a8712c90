//! Scripted collaborators shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use layer_assets::{
    AnalysisResult, AssetManager, AssetsConfig, Component, ComponentId, DocumentId,
    FsAssetFiles, InMemoryDocument, Layer, RenderEngine, RenderError, RenderRequest,
    RenderResult,
};
use tempfile::TempDir;
use tokio::sync::{oneshot, watch};

/// Comma-separated file names, optionally prefixed with a folder
/// (`icons/icon.png`). Fragments without an extension are errors.
pub fn analyze(name: &str) -> Vec<AnalysisResult> {
    name.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            if !part.contains('.') {
                return AnalysisResult::error(format!("not a file name: {part}"));
            }
            match part.rsplit_once('/') {
                Some((folder, file)) => {
                    AnalysisResult::component(Component::new(part, file).with_folder(folder))
                }
                None => AnalysisResult::component(Component::new(part, part)),
            }
        })
        .collect()
}

#[derive(Debug, Default, Clone)]
pub struct RenderLog {
    pub requests: Vec<ComponentId>,
    pub cancels: Vec<ComponentId>,
    pub cancel_all: Vec<DocumentId>,
}

/// Render engine whose renders settle only when the test says so.
pub struct ScriptedRenderer {
    honor_cancellation: bool,
    output_dir: TempDir,
    senders: Mutex<HashMap<ComponentId, VecDeque<oneshot::Sender<RenderResult>>>>,
    log: watch::Sender<RenderLog>,
    outputs: Mutex<u32>,
}

impl ScriptedRenderer {
    pub fn new() -> Self {
        Self::with_cancellation(true)
    }

    /// A renderer that keeps going after being cancelled.
    pub fn ignoring_cancellation() -> Self {
        Self::with_cancellation(false)
    }

    fn with_cancellation(honor_cancellation: bool) -> Self {
        Self {
            honor_cancellation,
            output_dir: TempDir::new().unwrap(),
            senders: Mutex::new(HashMap::new()),
            log: watch::channel(RenderLog::default()).0,
            outputs: Mutex::new(0),
        }
    }

    pub fn log(&self) -> RenderLog {
        self.log.borrow().clone()
    }

    /// Wait until the log satisfies `predicate`.
    pub async fn wait_until(&self, predicate: impl FnMut(&RenderLog) -> bool) {
        let mut rx = self.log.subscribe();
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(predicate))
            .await
            .expect("timed out waiting for renderer")
            .unwrap();
    }

    pub async fn wait_for_requests(&self, count: usize) {
        self.wait_until(|log| log.requests.len() >= count).await;
    }

    /// Write a temporary output file the way a real engine would.
    pub fn make_output(&self, contents: &str) -> PathBuf {
        let mut n = self.outputs.lock().unwrap();
        *n += 1;
        let path = self.output_dir.path().join(format!("render-{n}.tmp"));
        std::fs::write(&path, contents).unwrap();
        path
    }

    /// Settle the newest outstanding render of `id`.
    pub fn settle(&self, id: ComponentId, result: RenderResult) {
        let sender = self
            .senders
            .lock()
            .unwrap()
            .get_mut(&id)
            .and_then(VecDeque::pop_back)
            .expect("no outstanding render");
        // The render may already have given up after cancellation
        let _ = sender.send(result);
    }

    /// Settle the newest render of `id` successfully, returning the temp output.
    pub fn succeed(&self, id: ComponentId, contents: &str) -> PathBuf {
        let output = self.make_output(contents);
        self.settle(id, Ok(Some(output.clone())));
        output
    }
}

#[async_trait]
impl RenderEngine for ScriptedRenderer {
    async fn render(&self, request: RenderRequest) -> RenderResult {
        let (tx, rx) = oneshot::channel();
        self.senders
            .lock()
            .unwrap()
            .entry(request.component_id)
            .or_default()
            .push_back(tx);
        self.log
            .send_modify(|log| log.requests.push(request.component_id));

        if self.honor_cancellation {
            tokio::select! {
                _ = request.cancellation.cancelled() => Err(RenderError::Cancelled),
                result = rx => result.unwrap_or(Err(RenderError::Cancelled)),
            }
        } else {
            rx.await.unwrap_or(Err(RenderError::Cancelled))
        }
    }

    fn cancel(&self, component_id: ComponentId) {
        self.log.send_modify(|log| log.cancels.push(component_id));
    }

    fn cancel_all(&self, document_id: DocumentId) {
        self.log.send_modify(|log| log.cancel_all.push(document_id));
    }
}

/// A manager wired to an in-memory document, a scripted renderer and real
/// files under a temporary directory.
pub struct Harness {
    pub workspace: TempDir,
    pub document: Arc<InMemoryDocument>,
    pub renderer: Arc<ScriptedRenderer>,
    pub files: Arc<FsAssetFiles>,
    pub manager: AssetManager,
}

impl Harness {
    pub fn new(layers: impl IntoIterator<Item = Layer>) -> Self {
        Self::with_renderer(layers, ScriptedRenderer::new())
    }

    pub fn with_renderer(layers: impl IntoIterator<Item = Layer>, renderer: ScriptedRenderer) -> Self {
        let workspace = TempDir::new().unwrap();
        let document_file = workspace.path().join("poster.psd");
        let document = Arc::new(
            InMemoryDocument::new(DocumentId(1), document_file.to_string_lossy())
                .with_layers(layers),
        );
        let renderer = Arc::new(renderer);
        let files = Arc::new(FsAssetFiles::new(AssetsConfig::default()));
        let manager = AssetManager::new(
            document.clone(),
            Arc::new(analyze),
            renderer.clone(),
            files.clone(),
        );

        Self {
            workspace,
            document,
            renderer,
            files,
            manager,
        }
    }

    /// Absolute path of an asset under the document's assets directory.
    pub fn asset(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.workspace.path().join("poster-assets").join(relative)
    }

    pub async fn only_component_of(&self, layer: u32) -> ComponentId {
        let ids = self.manager.components_of(layer_assets::LayerId(layer)).await;
        assert_eq!(ids.len(), 1, "expected one component on layer {layer}");
        ids[0]
    }

    pub async fn settled(&self) {
        tokio::time::timeout(Duration::from_secs(5), self.manager.wait_for_renders())
            .await
            .expect("timed out waiting for renders");
    }
}
