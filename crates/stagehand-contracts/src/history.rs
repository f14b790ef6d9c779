use similar::TextDiff;

use crate::image::ImageHandle;

pub const INITIAL_LABEL: &str = "start";

/// One point in the edit timeline.
///
/// A snapshot with a `result_image` was produced by a successful generation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub result_image: Option<ImageHandle>,
    pub prompt_text: String,
    pub scene_image: Option<ImageHandle>,
    pub product_image: Option<ImageHandle>,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.result_image.is_none()
            && self.scene_image.is_none()
            && self.product_image.is_none()
            && self.prompt_text.is_empty()
    }

    /// The image a viewer shows for this point: the result, else the scene.
    pub fn display_image(&self) -> Option<&ImageHandle> {
        self.result_image.as_ref().or(self.scene_image.as_ref())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub snapshot: Snapshot,
    pub label: String,
    pub prompt_diff: Option<Vec<String>>,
}

/// Linear undo/redo timeline.
///
/// Never empty; `index` always points at an entry. Appending after an undo
/// drops every entry past the current index.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryStore {
    entries: Vec<HistoryEntry>,
    index: usize,
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryStore {
    pub fn new() -> Self {
        Self {
            entries: vec![HistoryEntry {
                snapshot: Snapshot::empty(),
                label: INITIAL_LABEL.to_string(),
                prompt_diff: None,
            }],
            index: 0,
        }
    }

    pub fn current(&self) -> &Snapshot {
        &self.entries[self.index].snapshot
    }

    pub fn current_entry(&self) -> &HistoryEntry {
        &self.entries[self.index]
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn labels(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.label.clone()).collect()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn can_undo(&self) -> bool {
        self.index > 0
    }

    pub fn can_redo(&self) -> bool {
        self.index + 1 < self.entries.len()
    }

    /// True while nothing has been generated on the current branch.
    pub fn is_pre_generation(&self) -> bool {
        self.entries.len() == 1 && self.current().result_image.is_none()
    }

    pub fn append(&mut self, snapshot: Snapshot, label: impl Into<String>) {
        let prompt_diff = prompt_diff(&self.current().prompt_text, &snapshot.prompt_text);
        self.entries.truncate(self.index + 1);
        self.entries.push(HistoryEntry {
            snapshot,
            label: label.into(),
            prompt_diff,
        });
        self.index = self.entries.len() - 1;
    }

    /// Discards the whole timeline in favour of a single entry.
    pub fn replace_with(&mut self, snapshot: Snapshot, label: impl Into<String>) {
        self.entries = vec![HistoryEntry {
            snapshot,
            label: label.into(),
            prompt_diff: None,
        }];
        self.index = 0;
    }

    /// Returns whether the index moved.
    pub fn undo(&mut self) -> bool {
        if !self.can_undo() {
            return false;
        }
        self.index -= 1;
        true
    }

    /// Returns whether the index moved.
    pub fn redo(&mut self) -> bool {
        if !self.can_redo() {
            return false;
        }
        self.index += 1;
        true
    }

    pub fn reset_to_empty(&mut self) {
        *self = Self::new();
    }
}

fn prompt_diff(prev: &str, curr: &str) -> Option<Vec<String>> {
    if prev.is_empty() && curr.is_empty() {
        return None;
    }
    let diff = TextDiff::from_words(prev, curr);
    let rendered = diff.unified_diff().header("prev", "curr").to_string();
    let lines = rendered
        .lines()
        .map(str::to_string)
        .collect::<Vec<String>>();
    Some(lines)
}

#[cfg(test)]
mod tests {
    use super::{HistoryStore, Snapshot, INITIAL_LABEL};
    use crate::image::ImageHandle;

    fn result(tag: u8) -> Snapshot {
        Snapshot {
            result_image: Some(ImageHandle::new(vec![tag], "image/png", "r.png")),
            prompt_text: format!("edit {tag}"),
            ..Snapshot::default()
        }
    }

    #[test]
    fn starts_with_single_empty_snapshot() {
        let history = HistoryStore::new();
        assert_eq!(history.len(), 1);
        assert_eq!(history.index(), 0);
        assert!(history.current().is_empty());
        assert_eq!(history.labels(), vec![INITIAL_LABEL.to_string()]);
        assert!(history.is_pre_generation());
    }

    #[test]
    fn append_advances_to_new_last_entry() {
        let mut history = HistoryStore::new();
        history.append(result(1), "edit 1");
        history.append(result(2), "edit 2");
        assert_eq!(history.len(), 3);
        assert_eq!(history.index(), 2);
        assert_eq!(history.current().prompt_text, "edit 2");
        assert!(!history.is_pre_generation());
    }

    #[test]
    fn undo_and_redo_are_noops_at_the_ends() {
        let mut history = HistoryStore::new();
        assert!(!history.undo());
        assert_eq!(history.index(), 0);

        history.append(result(1), "edit 1");
        assert!(!history.redo());
        assert_eq!(history.index(), 1);

        assert!(history.undo());
        assert_eq!(history.index(), 0);
        assert!(history.redo());
        assert_eq!(history.index(), 1);
    }

    #[test]
    fn append_after_undo_truncates_redo_branch() {
        let mut history = HistoryStore::new();
        history.append(result(1), "edit 1");
        history.append(result(2), "edit 2");
        history.append(result(3), "edit 3");
        history.undo();
        history.undo();
        assert_eq!(history.index(), 1);

        history.append(result(9), "edit 9");
        assert_eq!(history.len(), 3);
        assert_eq!(history.index(), 2);
        assert_eq!(
            history.labels(),
            vec![INITIAL_LABEL.to_string(), "edit 1".to_string(), "edit 9".to_string()]
        );
        assert!(!history.redo());
    }

    #[test]
    fn index_stays_in_bounds_under_mixed_operations() {
        let mut history = HistoryStore::new();
        let script = "aauurrrauuuuarrauara";
        for (step, op) in script.chars().enumerate() {
            match op {
                'a' => history.append(result(step as u8), format!("step {step}")),
                'u' => {
                    history.undo();
                }
                _ => {
                    history.redo();
                }
            }
            assert!(history.index() < history.len());
        }
    }

    #[test]
    fn replace_with_collapses_timeline() {
        let mut history = HistoryStore::new();
        history.append(result(1), "edit 1");
        history.replace_with(Snapshot::default(), "scene uploaded");
        assert_eq!(history.len(), 1);
        assert_eq!(history.index(), 0);
        assert_eq!(history.current_entry().label, "scene uploaded");
    }

    #[test]
    fn reset_restores_fresh_store() {
        let mut history = HistoryStore::new();
        history.append(result(1), "edit 1");
        history.reset_to_empty();
        assert_eq!(history, HistoryStore::new());
    }

    #[test]
    fn append_records_prompt_diff_against_previous_entry() {
        let mut history = HistoryStore::new();
        history.append(result(1), "edit 1");
        history.append(result(2), "edit 2");
        let diff = history.current_entry().prompt_diff.clone().unwrap_or_default();
        assert!(diff.iter().any(|line| line.starts_with("--- prev")));
        assert!(diff.iter().any(|line| line.contains('2')));
    }
}
