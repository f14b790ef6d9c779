use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Result;
use serde_json::{json, Value};
use stagehand_contracts::events::{EventKind, EventWriter};
use stagehand_contracts::session::{now_utc_iso, write_summary, SessionSummary};
use stagehand_contracts::{
    HistoryStore, ImageHandle, ImageRole, LayoutMode, MobilePanel, WorkspaceAction,
    WorkspaceError, WorkspaceState, WorkspaceView,
};

use crate::acquire::{import_camera_still, import_file, import_url, ImageFetcher, ImageSource};
use crate::export::{download_image, ShareOutcome, ShareTarget};
use crate::generation::{GenerationClient, GenerationRequest};
use crate::preview::{PreviewFile, PreviewStore};
use crate::{build_generation_client, map_object, EngineConfig, HttpImageFetcher};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewSlot {
    Scene,
    Product,
    Display,
}

impl PreviewSlot {
    fn as_str(self) -> &'static str {
        match self {
            PreviewSlot::Scene => "scene",
            PreviewSlot::Product => "product",
            PreviewSlot::Display => "display",
        }
    }
}

#[derive(Default)]
struct PreviewSlots {
    scene: Option<PreviewFile>,
    product: Option<PreviewFile>,
    display: Option<PreviewFile>,
}

/// Drives a [`WorkspaceState`] against real collaborators: the generation
/// client, the URL fetcher, preview files, the event log and exports.
///
/// Calls are sequential; the busy flag in the state rejects overlap. Once an
/// action is applied the operation's outcome is fixed: event log and preview
/// writes after that point are best-effort and land in [`Self::take_warnings`].
pub struct WorkspaceEngine {
    out_dir: PathBuf,
    session_id: String,
    started_at: String,
    events: EventWriter,
    state: WorkspaceState,
    client: Box<dyn GenerationClient>,
    fetcher: Box<dyn ImageFetcher>,
    previews: PreviewStore,
    slots: PreviewSlots,
    app_name: String,
    generations: u64,
    warnings: Vec<String>,
    summary_path: PathBuf,
}

impl WorkspaceEngine {
    pub fn new(
        out_dir: impl Into<PathBuf>,
        events_path: impl Into<PathBuf>,
        config: &EngineConfig,
    ) -> Result<Self> {
        let client = build_generation_client(config)?;
        let fetcher = Box::new(HttpImageFetcher::new(config.image_proxy.clone()));
        Self::with_collaborators(out_dir, events_path, &config.app_name, client, fetcher)
    }

    pub fn with_collaborators(
        out_dir: impl Into<PathBuf>,
        events_path: impl Into<PathBuf>,
        app_name: &str,
        client: Box<dyn GenerationClient>,
        fetcher: Box<dyn ImageFetcher>,
    ) -> Result<Self> {
        let out_dir = out_dir.into();
        std::fs::create_dir_all(&out_dir)?;
        let session_id = out_dir
            .file_name()
            .and_then(|value| value.to_str())
            .filter(|value| !value.is_empty())
            .unwrap_or("session-rs")
            .to_string();
        let events = EventWriter::new(events_path.into(), session_id.clone());
        events.emit(
            EventKind::SessionStarted,
            map_object(json!({
                "out_dir": out_dir.to_string_lossy().to_string(),
                "model": client.model(),
            })),
        )?;

        Ok(Self {
            previews: PreviewStore::new(out_dir.join("previews")),
            summary_path: out_dir.join("summary.json"),
            out_dir,
            session_id,
            started_at: now_utc_iso(),
            events,
            state: WorkspaceState::default(),
            client,
            fetcher,
            slots: PreviewSlots::default(),
            app_name: app_name.to_string(),
            generations: 0,
            warnings: Vec::new(),
        })
    }

    pub fn state(&self) -> &WorkspaceState {
        &self.state
    }

    pub fn history(&self) -> &HistoryStore {
        self.state.history()
    }

    pub fn view(&self) -> WorkspaceView {
        self.state.view()
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    pub fn event_writer(&self) -> EventWriter {
        self.events.clone()
    }

    pub fn client_name(&self) -> &str {
        self.client.name()
    }

    pub fn model(&self) -> &str {
        self.client.model()
    }

    pub fn generations(&self) -> u64 {
        self.generations
    }

    pub fn set_client(&mut self, client: Box<dyn GenerationClient>) {
        self.client = client;
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Drains event log and preview problems collected since the last call.
    pub fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }

    pub fn preview_path(&self, slot: PreviewSlot) -> Option<&Path> {
        let preview = match slot {
            PreviewSlot::Scene => self.slots.scene.as_ref(),
            PreviewSlot::Product => self.slots.product.as_ref(),
            PreviewSlot::Display => self.slots.display.as_ref(),
        };
        preview.map(PreviewFile::path)
    }

    pub fn edit_prompt(&mut self, text: impl Into<String>) {
        self.state.apply(WorkspaceAction::PromptEdited(text.into()));
    }

    pub fn set_viewport_width(&mut self, width: u32) {
        self.state.apply(WorkspaceAction::ViewportResized { width });
    }

    pub fn set_layout(&mut self, layout: LayoutMode) {
        self.state.apply(WorkspaceAction::LayoutChanged(layout));
    }

    pub fn toggle_panel(&mut self, panel: MobilePanel) {
        self.state.apply(WorkspaceAction::PanelToggled(panel));
    }

    pub fn skip_onboarding(&mut self) {
        self.state.apply(WorkspaceAction::OnboardingSkipped);
    }

    pub fn dismiss_first_result_hint(&mut self) {
        self.state.apply(WorkspaceAction::FirstResultHintDismissed);
    }

    pub fn import_file(&mut self, role: ImageRole, path: &Path) -> Result<ImageHandle, WorkspaceError> {
        let imported = import_file(path);
        self.finish_import(role, ImageSource::File, imported)
    }

    pub fn import_camera_still(
        &mut self,
        role: ImageRole,
        bytes: Vec<u8>,
        mime_type: Option<&str>,
    ) -> Result<ImageHandle, WorkspaceError> {
        let imported = import_camera_still(bytes, mime_type);
        self.finish_import(role, ImageSource::Camera, imported)
    }

    pub fn import_url(&mut self, role: ImageRole, url: &str) -> Result<ImageHandle, WorkspaceError> {
        let imported = import_url(self.fetcher.as_ref(), url);
        self.finish_import(role, ImageSource::Url, imported)
    }

    /// URL when the source looks like one, local file otherwise.
    pub fn import_source(
        &mut self,
        role: ImageRole,
        source: &str,
    ) -> Result<ImageHandle, WorkspaceError> {
        let trimmed = source.trim();
        let lowered = trimmed.to_ascii_lowercase();
        if lowered.starts_with("http://") || lowered.starts_with("https://") {
            self.import_url(role, trimmed)
        } else {
            self.import_file(role, Path::new(trimmed))
        }
    }

    fn finish_import(
        &mut self,
        role: ImageRole,
        source: ImageSource,
        imported: Result<ImageHandle, WorkspaceError>,
    ) -> Result<ImageHandle, WorkspaceError> {
        let image = match imported {
            Ok(image) => image,
            Err(error) => {
                self.state.apply(WorkspaceAction::ImportFailed {
                    error: error.clone(),
                });
                self.record(
                    EventKind::ImageImportFailed,
                    json!({
                        "role": role.as_str(),
                        "source": source.as_str(),
                        "error_kind": error.kind(),
                        "error": error.to_string(),
                    }),
                );
                return Err(error);
            }
        };

        self.state.apply(WorkspaceAction::ImageImported {
            role,
            image: image.clone(),
        });
        self.refresh_previews();
        self.record(
            EventKind::ImageImported,
            json!({
                "role": role.as_str(),
                "source": source.as_str(),
                "mime_type": image.mime_type(),
                "file_name": image.file_name(),
                "bytes": image.len(),
                "sha256": image.sha256_hex(),
                "history_len": self.state.history().len(),
            }),
        );
        Ok(image)
    }

    /// Generates from the pending prompt in the state.
    pub fn generate_pending(&mut self) -> Result<ImageHandle, WorkspaceError> {
        let prompt = self.state.prompt_input().to_string();
        self.generate(&prompt)
    }

    /// Plans, calls the client once, and commits the result. Every exit
    /// leaves the busy flag cleared.
    pub fn generate(&mut self, prompt: &str) -> Result<ImageHandle, WorkspaceError> {
        let plan = match self.state.plan_generation(prompt) {
            Ok(plan) => plan,
            Err(error) => return Err(self.fail_generation(error)),
        };
        let request = GenerationRequest::from_plan(&plan);

        self.state.apply(WorkspaceAction::GenerationStarted);
        self.record(
            EventKind::GenerationStarted,
            json!({
                "base": plan.base_source.as_str(),
                "product_included": request.includes_product(),
                "prompt": plan.instruction,
                "model": self.client.model(),
            }),
        );

        let started = Instant::now();
        let image = match self.client.generate(&request) {
            Ok(image) => image,
            Err(error) => return Err(self.fail_generation(error)),
        };

        self.state.apply(WorkspaceAction::GenerationSucceeded {
            image: image.clone(),
            prompt: plan.instruction,
        });
        self.generations += 1;
        self.refresh_previews();
        let history = self.state.history();
        let payload = json!({
            "history_len": history.len(),
            "history_index": history.index(),
            "mime_type": image.mime_type(),
            "bytes": image.len(),
            "latency_s": started.elapsed().as_secs_f64(),
        });
        self.record(EventKind::GenerationFinished, payload);
        Ok(image)
    }

    fn fail_generation(&mut self, error: WorkspaceError) -> WorkspaceError {
        self.state.apply(WorkspaceAction::GenerationFailed {
            error: error.clone(),
        });
        self.record(
            EventKind::GenerationFailed,
            json!({
                "error_kind": error.kind(),
                "error": error.to_string(),
            }),
        );
        error
    }

    /// Returns whether the index moved.
    pub fn undo(&mut self) -> bool {
        let before = self.state.history().index();
        self.state.apply(WorkspaceAction::Undo);
        self.after_history_move("undo", Some(before))
    }

    /// Returns whether the index moved.
    pub fn redo(&mut self) -> bool {
        let before = self.state.history().index();
        self.state.apply(WorkspaceAction::Redo);
        self.after_history_move("redo", Some(before))
    }

    pub fn reset(&mut self) {
        self.state.apply(WorkspaceAction::Reset);
        self.after_history_move("reset", None);
    }

    fn after_history_move(&mut self, action: &str, before: Option<usize>) -> bool {
        let history = self.state.history();
        if before == Some(history.index()) {
            return false;
        }
        let payload = json!({
            "action": action,
            "history_index": history.index(),
            "history_len": history.len(),
        });
        self.refresh_previews();
        self.record(EventKind::HistoryMoved, payload);
        true
    }

    /// Writes the image on screen as `{app}-creation-{timestamp}.png`.
    pub fn download(&mut self, dir: Option<&Path>) -> Result<PathBuf, WorkspaceError> {
        let image = self.exportable()?;
        let dir = dir
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.out_dir.clone());
        let path = download_image(&image, &dir, &self.app_name)
            .map_err(|err| WorkspaceError::Io(format!("{err:#}")))?;
        self.record(
            EventKind::ImageExported,
            json!({
                "action": "download",
                "path": path.to_string_lossy().to_string(),
            }),
        );
        Ok(path)
    }

    /// Shares the image on screen. A cancelled share sheet is not an error.
    pub fn share(&mut self, target: &dyn ShareTarget) -> Result<ShareOutcome, WorkspaceError> {
        let image = self.exportable()?;
        let path = download_image(&image, &self.out_dir.join("shared"), &self.app_name)
            .map_err(|err| WorkspaceError::Io(format!("{err:#}")))?;
        let outcome = target
            .share(&path, &self.app_name)
            .map_err(|err| WorkspaceError::Io(format!("{err:#}")))?;
        if outcome != ShareOutcome::Cancelled {
            self.record(
                EventKind::ImageExported,
                json!({
                    "action": "share",
                    "outcome": outcome.as_str(),
                    "path": path.to_string_lossy().to_string(),
                }),
            );
        }
        Ok(outcome)
    }

    fn exportable(&self) -> Result<ImageHandle, WorkspaceError> {
        self.state
            .current()
            .display_image()
            .cloned()
            .ok_or(WorkspaceError::NothingToExport)
    }

    /// Writes `summary.json` and releases preview files. Unlike per-operation
    /// logging, failures here are returned.
    pub fn finish(&mut self) -> Result<()> {
        self.slots = PreviewSlots::default();
        let history = self.state.history();
        let summary = SessionSummary {
            session_id: self.session_id.clone(),
            started_at: self.started_at.clone(),
            finished_at: now_utc_iso(),
            history_len: history.len() as u64,
            history_index: history.index() as u64,
            generations: self.generations,
            labels: history.labels(),
        };
        let extra = map_object(json!({
            "model": self.client.model(),
            "events_path": self.events.path().to_string_lossy().to_string(),
            "events_written": self.events.written(),
            "warnings": self.warnings.len(),
        }));
        write_summary(&self.summary_path, &summary, Some(&extra))?;
        self.events.emit(
            EventKind::SessionFinished,
            map_object(json!({
                "history_len": summary.history_len,
                "generations": summary.generations,
            })),
        )?;
        Ok(())
    }

    fn record(&mut self, kind: EventKind, payload: Value) {
        if let Err(err) = self.events.emit(kind, map_object(payload)) {
            self.warnings.push(format!("event log: {err:#}"));
        }
    }

    fn refresh_previews(&mut self) {
        if let Err(err) = self.sync_previews() {
            self.warnings.push(format!("preview: {err:#}"));
        }
    }

    fn sync_previews(&mut self) -> Result<()> {
        let current = self.state.current().clone();
        sync_slot(
            &self.previews,
            &mut self.slots.scene,
            PreviewSlot::Scene,
            current.scene_image.as_ref(),
        )?;
        sync_slot(
            &self.previews,
            &mut self.slots.product,
            PreviewSlot::Product,
            current.product_image.as_ref(),
        )?;
        sync_slot(
            &self.previews,
            &mut self.slots.display,
            PreviewSlot::Display,
            current.display_image(),
        )
    }
}

/// Keeps a slot's preview in step with the image it should show. The old
/// file is released before the new one is written, so a failed write leaves
/// the slot empty rather than stale.
fn sync_slot(
    store: &PreviewStore,
    slot: &mut Option<PreviewFile>,
    name: PreviewSlot,
    image: Option<&ImageHandle>,
) -> Result<()> {
    let Some(image) = image else {
        *slot = None;
        return Ok(());
    };
    if slot.as_ref().is_some_and(|preview| preview.previews(image)) {
        return Ok(());
    }
    *slot = None;
    *slot = Some(store.create(image, name.as_str())?);
    Ok(())
}
