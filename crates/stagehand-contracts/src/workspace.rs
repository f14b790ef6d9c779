use crate::errors::{ErrorSurface, WorkspaceError};
use crate::history::{HistoryStore, Snapshot};
use crate::image::ImageHandle;

/// Viewports narrower than this use the single-panel layout.
pub const COMPACT_BREAKPOINT_PX: u32 = 768;

pub const DEFAULT_PRODUCT_INSTRUCTION: &str = "Place the product naturally into the scene.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageRole {
    Scene,
    Product,
}

impl ImageRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ImageRole::Scene => "scene",
            ImageRole::Product => "product",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "scene" | "background" => Some(ImageRole::Scene),
            "product" | "item" => Some(ImageRole::Product),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutMode {
    Compact,
    Wide,
}

impl LayoutMode {
    pub fn from_viewport_width(width: u32) -> Self {
        if width < COMPACT_BREAKPOINT_PX {
            LayoutMode::Compact
        } else {
            LayoutMode::Wide
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "compact" | "mobile" => Some(LayoutMode::Compact),
            "wide" | "desktop" => Some(LayoutMode::Wide),
            _ => normalized
                .trim_end_matches("px")
                .parse::<u32>()
                .ok()
                .map(Self::from_viewport_width),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LayoutMode::Compact => "compact",
            LayoutMode::Wide => "wide",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MobilePanel {
    Images,
    Tools,
    None,
}

impl MobilePanel {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "images" | "image" => Some(MobilePanel::Images),
            "tools" | "tool" => Some(MobilePanel::Tools),
            "none" | "hide" => Some(MobilePanel::None),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MobilePanel::Images => "images",
            MobilePanel::Tools => "tools",
            MobilePanel::None => "none",
        }
    }
}

/// First-run sequence shown on compact viewports until the first result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnboardingStep {
    Product,
    Scene,
    Workspace,
}

impl OnboardingStep {
    pub fn as_str(self) -> &'static str {
        match self {
            OnboardingStep::Product => "product",
            OnboardingStep::Scene => "scene",
            OnboardingStep::Workspace => "workspace",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelVisibility {
    pub images: bool,
    pub tools: bool,
}

/// What a front end should render, derived once per pass from the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspaceView {
    Onboarding(OnboardingStep),
    Panels(PanelVisibility),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseSource {
    PriorResult,
    Scene,
}

impl BaseSource {
    pub fn as_str(self) -> &'static str {
        match self {
            BaseSource::PriorResult => "result",
            BaseSource::Scene => "scene",
        }
    }
}

/// Inputs for one generation call, assembled right before it is made.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationPlan {
    pub base: ImageHandle,
    pub base_source: BaseSource,
    pub product: Option<ImageHandle>,
    pub instruction: String,
}

#[derive(Debug, Clone)]
pub enum WorkspaceAction {
    ImageImported {
        role: ImageRole,
        image: ImageHandle,
    },
    ImportFailed {
        error: WorkspaceError,
    },
    PromptEdited(String),
    GenerationStarted,
    GenerationSucceeded {
        image: ImageHandle,
        prompt: String,
    },
    GenerationFailed {
        error: WorkspaceError,
    },
    Undo,
    Redo,
    Reset,
    ViewportResized {
        width: u32,
    },
    LayoutChanged(LayoutMode),
    PanelToggled(MobilePanel),
    OnboardingSkipped,
    FirstResultHintDismissed,
}

/// Whole application state. Mutated only through [`WorkspaceState::apply`].
#[derive(Debug, Clone)]
pub struct WorkspaceState {
    history: HistoryStore,
    prompt_input: String,
    error: Option<(ErrorSurface, String)>,
    busy: bool,
    has_generated: bool,
    first_result_hint: bool,
    layout: LayoutMode,
    panel: MobilePanel,
    onboarding: OnboardingStep,
}

impl Default for WorkspaceState {
    fn default() -> Self {
        Self::new(LayoutMode::Wide)
    }
}

impl WorkspaceState {
    pub fn new(layout: LayoutMode) -> Self {
        Self {
            history: HistoryStore::new(),
            prompt_input: String::new(),
            error: None,
            busy: false,
            has_generated: false,
            first_result_hint: false,
            layout,
            panel: MobilePanel::Images,
            onboarding: OnboardingStep::Product,
        }
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn current(&self) -> &Snapshot {
        self.history.current()
    }

    pub fn prompt_input(&self) -> &str {
        &self.prompt_input
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_ref().map(|(_, message)| message.as_str())
    }

    pub fn error_surface(&self) -> Option<ErrorSurface> {
        self.error.as_ref().map(|(surface, _)| *surface)
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn has_generated(&self) -> bool {
        self.has_generated
    }

    /// Raised once, by the first successful generation of the session.
    pub fn first_result_hint(&self) -> bool {
        self.first_result_hint
    }

    pub fn layout(&self) -> LayoutMode {
        self.layout
    }

    pub fn panel(&self) -> MobilePanel {
        self.panel
    }

    pub fn onboarding(&self) -> OnboardingStep {
        self.onboarding
    }

    pub fn view(&self) -> WorkspaceView {
        match self.layout {
            LayoutMode::Wide => WorkspaceView::Panels(PanelVisibility {
                images: true,
                tools: true,
            }),
            LayoutMode::Compact if self.onboarding != OnboardingStep::Workspace => {
                WorkspaceView::Onboarding(self.onboarding)
            }
            LayoutMode::Compact => WorkspaceView::Panels(PanelVisibility {
                images: self.panel == MobilePanel::Images,
                tools: self.panel == MobilePanel::Tools,
            }),
        }
    }

    /// Picks the base image and instruction for the next generation.
    ///
    /// A prior result is the base and the product is not resent. Otherwise
    /// the scene is the base and the product rides along.
    pub fn plan_generation(&self, prompt: &str) -> Result<GenerationPlan, WorkspaceError> {
        if self.busy {
            return Err(WorkspaceError::Busy);
        }
        let current = self.history.current();
        let (base, base_source, product) = if let Some(result) = current.result_image.as_ref() {
            (result.clone(), BaseSource::PriorResult, None)
        } else if let Some(scene) = current.scene_image.as_ref() {
            (
                scene.clone(),
                BaseSource::Scene,
                current.product_image.clone(),
            )
        } else {
            return Err(WorkspaceError::MissingInput);
        };

        let trimmed = prompt.trim();
        let instruction = if !trimmed.is_empty() {
            trimmed.to_string()
        } else if product.is_some() {
            DEFAULT_PRODUCT_INSTRUCTION.to_string()
        } else {
            return Err(WorkspaceError::EmptyPrompt);
        };

        Ok(GenerationPlan {
            base,
            base_source,
            product,
            instruction,
        })
    }

    pub fn apply(&mut self, action: WorkspaceAction) {
        match action {
            WorkspaceAction::ImageImported { role, image } => {
                self.import_image(role, image);
                self.error = None;
                self.advance_onboarding();
            }
            WorkspaceAction::ImportFailed { error } | WorkspaceAction::GenerationFailed { error } => {
                self.busy = false;
                self.error = Some((error.surface(), error.to_string()));
            }
            WorkspaceAction::PromptEdited(text) => {
                self.prompt_input = text;
            }
            WorkspaceAction::GenerationStarted => {
                self.busy = true;
                self.error = None;
            }
            WorkspaceAction::GenerationSucceeded { image, prompt } => {
                let current = self.history.current();
                let snapshot = Snapshot {
                    result_image: Some(image),
                    prompt_text: prompt.clone(),
                    scene_image: current.scene_image.clone(),
                    product_image: current.product_image.clone(),
                };
                self.history.append(snapshot, prompt);
                self.prompt_input.clear();
                self.busy = false;
                self.error = None;
                if !self.has_generated {
                    self.has_generated = true;
                    self.first_result_hint = true;
                }
                self.onboarding = OnboardingStep::Workspace;
                if self.layout == LayoutMode::Compact {
                    self.panel = MobilePanel::Images;
                }
            }
            WorkspaceAction::Undo => {
                if self.history.undo() {
                    self.error = None;
                }
            }
            WorkspaceAction::Redo => {
                if self.history.redo() {
                    self.error = None;
                }
            }
            WorkspaceAction::Reset => {
                self.history.reset_to_empty();
                self.prompt_input.clear();
                self.error = None;
                self.busy = false;
            }
            WorkspaceAction::ViewportResized { width } => {
                self.layout = LayoutMode::from_viewport_width(width);
            }
            WorkspaceAction::LayoutChanged(layout) => {
                self.layout = layout;
            }
            WorkspaceAction::PanelToggled(panel) => {
                self.panel = if self.panel == panel {
                    MobilePanel::None
                } else {
                    panel
                };
            }
            WorkspaceAction::OnboardingSkipped => {
                self.onboarding = OnboardingStep::Workspace;
            }
            WorkspaceAction::FirstResultHintDismissed => {
                self.first_result_hint = false;
            }
        }
    }

    fn import_image(&mut self, role: ImageRole, image: ImageHandle) {
        let current = self.history.current().clone();
        let label = format!("{} uploaded", role.as_str());

        if self.history.is_pre_generation() {
            let mut snapshot = current;
            match role {
                ImageRole::Scene => snapshot.scene_image = Some(image),
                ImageRole::Product => snapshot.product_image = Some(image),
            }
            self.history.replace_with(snapshot, label);
            return;
        }

        // A new input starts a fresh canvas; a new product lands on the latest result.
        let snapshot = match role {
            ImageRole::Scene => Snapshot {
                result_image: None,
                prompt_text: String::new(),
                scene_image: Some(image),
                product_image: current.product_image,
            },
            ImageRole::Product => Snapshot {
                result_image: None,
                prompt_text: String::new(),
                scene_image: current.result_image.or(current.scene_image),
                product_image: Some(image),
            },
        };
        self.history.append(snapshot, label);
    }

    fn advance_onboarding(&mut self) {
        if self.onboarding == OnboardingStep::Workspace {
            return;
        }
        let current = self.history.current();
        self.onboarding = if current.product_image.is_none() {
            OnboardingStep::Product
        } else if current.scene_image.is_none() {
            OnboardingStep::Scene
        } else {
            OnboardingStep::Workspace
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(tag: u8) -> ImageHandle {
        ImageHandle::new(vec![tag; 4], "image/png", format!("img-{tag}.png"))
    }

    fn imported(role: ImageRole, tag: u8) -> WorkspaceAction {
        WorkspaceAction::ImageImported {
            role,
            image: image(tag),
        }
    }

    fn succeeded(tag: u8, prompt: &str) -> WorkspaceAction {
        WorkspaceAction::GenerationSucceeded {
            image: image(tag),
            prompt: prompt.to_string(),
        }
    }

    #[test]
    fn plan_without_inputs_reports_missing_input() {
        let state = WorkspaceState::default();
        assert_eq!(
            state.plan_generation("make it pop"),
            Err(WorkspaceError::MissingInput)
        );

        let mut product_only = WorkspaceState::default();
        product_only.apply(imported(ImageRole::Product, 2));
        assert_eq!(
            product_only.plan_generation("make it pop"),
            Err(WorkspaceError::MissingInput)
        );
    }

    #[test]
    fn plan_uses_scene_and_product_before_any_result() {
        let mut state = WorkspaceState::default();
        state.apply(imported(ImageRole::Scene, 1));
        state.apply(imported(ImageRole::Product, 2));

        let plan = state.plan_generation("  place it on the left ").unwrap();
        assert_eq!(plan.base, image(1));
        assert_eq!(plan.base_source, BaseSource::Scene);
        assert_eq!(plan.product, Some(image(2)));
        assert_eq!(plan.instruction, "place it on the left");
    }

    #[test]
    fn plan_after_result_uses_result_and_drops_product() {
        let mut state = WorkspaceState::default();
        state.apply(imported(ImageRole::Scene, 1));
        state.apply(imported(ImageRole::Product, 2));
        state.apply(succeeded(3, "place it on the left"));

        let plan = state.plan_generation("make it sunset").unwrap();
        assert_eq!(plan.base, image(3));
        assert_eq!(plan.base_source, BaseSource::PriorResult);
        assert!(plan.product.is_none());
    }

    #[test]
    fn empty_prompt_defaults_only_when_product_is_sent() {
        let mut state = WorkspaceState::default();
        state.apply(imported(ImageRole::Scene, 1));
        assert_eq!(state.plan_generation("   "), Err(WorkspaceError::EmptyPrompt));

        state.apply(imported(ImageRole::Product, 2));
        let plan = state.plan_generation("").unwrap();
        assert_eq!(plan.instruction, DEFAULT_PRODUCT_INSTRUCTION);
    }

    #[test]
    fn busy_state_rejects_second_plan() {
        let mut state = WorkspaceState::default();
        state.apply(imported(ImageRole::Scene, 1));
        state.apply(WorkspaceAction::GenerationStarted);
        assert_eq!(state.plan_generation("x"), Err(WorkspaceError::Busy));

        state.apply(WorkspaceAction::GenerationFailed {
            error: WorkspaceError::NoOutput,
        });
        assert!(!state.is_busy());
        assert!(state.plan_generation("x").is_ok());
    }

    #[test]
    fn uploads_before_first_result_keep_single_entry() {
        let mut state = WorkspaceState::default();
        state.apply(imported(ImageRole::Scene, 1));
        state.apply(imported(ImageRole::Product, 2));
        assert_eq!(state.history().len(), 1);
        assert_eq!(state.current().scene_image, Some(image(1)));
        assert_eq!(state.current().product_image, Some(image(2)));
    }

    #[test]
    fn end_to_end_history_counts() {
        let mut state = WorkspaceState::default();
        state.apply(imported(ImageRole::Scene, 1));
        state.apply(imported(ImageRole::Product, 2));
        state.apply(succeeded(3, "place it on the left"));

        assert_eq!(state.history().len(), 2);
        let entry = state.current();
        assert_eq!(entry.result_image, Some(image(3)));
        assert_eq!(entry.scene_image, Some(image(1)));
        assert_eq!(entry.product_image, Some(image(2)));
        assert_eq!(entry.prompt_text, "place it on the left");

        state.apply(succeeded(4, "make it sunset"));
        assert_eq!(state.history().len(), 3);
        assert_eq!(state.history().current_entry().label, "make it sunset");
    }

    #[test]
    fn scene_upload_after_result_starts_fresh_canvas() {
        let mut state = WorkspaceState::default();
        state.apply(imported(ImageRole::Scene, 1));
        state.apply(imported(ImageRole::Product, 2));
        state.apply(succeeded(3, "compose"));
        state.apply(imported(ImageRole::Scene, 5));

        assert_eq!(state.history().len(), 3);
        let plan = state.plan_generation("again").unwrap();
        assert_eq!(plan.base, image(5));
        assert_eq!(plan.product, Some(image(2)));

        state.apply(WorkspaceAction::Undo);
        assert_eq!(state.current().result_image, Some(image(3)));
    }

    #[test]
    fn product_upload_after_result_composes_onto_result() {
        let mut state = WorkspaceState::default();
        state.apply(imported(ImageRole::Scene, 1));
        state.apply(succeeded(3, "relight"));
        state.apply(imported(ImageRole::Product, 6));

        let plan = state.plan_generation("add the lamp").unwrap();
        assert_eq!(plan.base, image(3));
        assert_eq!(plan.base_source, BaseSource::Scene);
        assert_eq!(plan.product, Some(image(6)));
    }

    #[test]
    fn success_clears_prompt_and_raises_hint_once() {
        let mut state = WorkspaceState::default();
        state.apply(imported(ImageRole::Scene, 1));
        state.apply(WorkspaceAction::PromptEdited("brighter".to_string()));
        state.apply(WorkspaceAction::GenerationStarted);
        assert!(state.is_busy());
        state.apply(succeeded(2, "brighter"));

        assert_eq!(state.prompt_input(), "");
        assert!(!state.is_busy());
        assert!(state.first_result_hint());

        state.apply(WorkspaceAction::FirstResultHintDismissed);
        state.apply(succeeded(3, "warmer"));
        assert!(!state.first_result_hint());
    }

    #[test]
    fn failures_set_error_without_touching_history() {
        let mut state = WorkspaceState::default();
        state.apply(imported(ImageRole::Scene, 1));
        let before = state.history().clone();

        state.apply(WorkspaceAction::ImportFailed {
            error: WorkspaceError::InvalidImage("text/html".to_string()),
        });
        assert_eq!(state.history(), &before);
        assert_eq!(state.error_surface(), Some(ErrorSurface::ImportField));

        state.apply(WorkspaceAction::GenerationFailed {
            error: WorkspaceError::Configuration("missing key".to_string()),
        });
        assert_eq!(state.error_surface(), Some(ErrorSurface::Banner));

        state.apply(succeeded(2, "ok"));
        assert!(state.error().is_none());
    }

    #[test]
    fn reset_clears_history_and_transient_state() {
        let mut state = WorkspaceState::default();
        state.apply(imported(ImageRole::Scene, 1));
        state.apply(WorkspaceAction::GenerationStarted);
        state.apply(WorkspaceAction::GenerationFailed {
            error: WorkspaceError::NoOutput,
        });
        state.apply(WorkspaceAction::Reset);

        assert_eq!(state.history().len(), 1);
        assert!(state.current().is_empty());
        assert!(state.error().is_none());
        assert!(!state.is_busy());
    }

    #[test]
    fn compact_layout_walks_onboarding_then_panels() {
        let mut state = WorkspaceState::new(LayoutMode::from_viewport_width(390));
        assert_eq!(
            state.view(),
            WorkspaceView::Onboarding(OnboardingStep::Product)
        );

        state.apply(imported(ImageRole::Product, 2));
        assert_eq!(state.view(), WorkspaceView::Onboarding(OnboardingStep::Scene));

        state.apply(imported(ImageRole::Scene, 1));
        assert_eq!(
            state.view(),
            WorkspaceView::Panels(PanelVisibility {
                images: true,
                tools: false,
            })
        );

        state.apply(WorkspaceAction::PanelToggled(MobilePanel::Tools));
        assert_eq!(state.panel(), MobilePanel::Tools);
        state.apply(WorkspaceAction::PanelToggled(MobilePanel::Tools));
        assert_eq!(state.panel(), MobilePanel::None);

        state.apply(succeeded(3, "compose"));
        assert_eq!(state.panel(), MobilePanel::Images);
    }

    #[test]
    fn wide_layout_shows_both_panels_and_skip_ends_onboarding() {
        let mut state = WorkspaceState::new(LayoutMode::Compact);
        state.apply(WorkspaceAction::OnboardingSkipped);
        assert_eq!(state.onboarding(), OnboardingStep::Workspace);

        state.apply(WorkspaceAction::ViewportResized { width: 1280 });
        assert_eq!(state.layout(), LayoutMode::Wide);
        assert_eq!(
            state.view(),
            WorkspaceView::Panels(PanelVisibility {
                images: true,
                tools: true,
            })
        );
    }

    #[test]
    fn parsers_accept_aliases() {
        assert_eq!(LayoutMode::parse("390px"), Some(LayoutMode::Compact));
        assert_eq!(LayoutMode::parse("desktop"), Some(LayoutMode::Wide));
        assert_eq!(MobilePanel::parse("Tools"), Some(MobilePanel::Tools));
        assert_eq!(ImageRole::parse("background"), Some(ImageRole::Scene));
        assert_eq!(ImageRole::parse("canvas"), None);
    }
}
