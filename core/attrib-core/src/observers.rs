//! Producer adapters for host file events and command completions.

use crate::config::CommandFilterConfig;
use crate::coordinator::ActivityInput;
use crate::types::FileChangeEvent;
use std::sync::Arc;

/// Forwards every file change to the coordinator for classification.
///
/// Refresh-style events are not filtered: agent writes often surface as a
/// refresh after the fact and are needed for correlation.
pub struct FileChangeObserver {
    input: Arc<dyn ActivityInput>,
}

impl FileChangeObserver {
    pub fn new(input: Arc<dyn ActivityInput>) -> Self {
        Self { input }
    }

    pub fn observe(&self, event: &FileChangeEvent) {
        tracing::debug!(path = %event.path, kind = event.kind.as_str(), "File change observed");
        self.input.handle_file_change(&event.path);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    EmptyName,
    OwnCommand,
    NoiseCommand,
    AgentStack,
}

/// Treats finished editor commands as human activity, minus noise and
/// agent-driven commands.
pub struct CommandObserver {
    config: CommandFilterConfig,
    input: Arc<dyn ActivityInput>,
}

impl CommandObserver {
    pub fn new(config: CommandFilterConfig, input: Arc<dyn ActivityInput>) -> Self {
        Self { config, input }
    }

    pub fn ignore_reason<S: AsRef<str>>(&self, name: &str, frames: &[S]) -> Option<IgnoreReason> {
        let name = name.trim();
        if name.is_empty() {
            return Some(IgnoreReason::EmptyName);
        }

        let lowered = name.to_lowercase();
        if self
            .config
            .own_commands
            .iter()
            .any(|own| !own.is_empty() && lowered.contains(&own.to_lowercase()))
        {
            return Some(IgnoreReason::OwnCommand);
        }

        if self.config.ignored.iter().any(|ignored| ignored == name) {
            return Some(IgnoreReason::NoiseCommand);
        }

        if self.has_agent_frame(frames) {
            return Some(IgnoreReason::AgentStack);
        }

        None
    }

    /// Requests a human checkpoint unless the command is filtered.
    /// Returns whether the command was forwarded.
    pub fn observe<S: AsRef<str>>(&self, name: &str, frames: &[S]) -> bool {
        if let Some(reason) = self.ignore_reason(name, frames) {
            tracing::debug!(command = %name, reason = ?reason, "Command ignored");
            return false;
        }

        tracing::debug!(command = %name, "Command counted as human activity");
        self.input.request_human_checkpoint();
        true
    }

    fn has_agent_frame<S: AsRef<str>>(&self, frames: &[S]) -> bool {
        let markers: Vec<String> = self
            .config
            .agent_frame_markers
            .iter()
            .filter(|marker| !marker.is_empty())
            .map(|marker| marker.to_lowercase())
            .collect();
        if markers.is_empty() {
            return false;
        }

        frames
            .iter()
            .take(self.config.stack_depth)
            .any(|frame| {
                let frame = frame.as_ref().to_lowercase();
                markers.iter().any(|marker| frame.contains(marker.as_str()))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FileChangeKind;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingInput {
        events: Mutex<Vec<String>>,
    }

    impl ActivityInput for RecordingInput {
        fn signal_ai_activity(&self) {
            self.events.lock().unwrap().push("signal".to_string());
        }

        fn handle_file_change(&self, path: &str) {
            self.events.lock().unwrap().push(format!("file:{}", path));
        }

        fn request_human_checkpoint(&self) {
            self.events.lock().unwrap().push("human".to_string());
        }
    }

    fn command_observer() -> (CommandObserver, Arc<RecordingInput>) {
        let input = Arc::new(RecordingInput::default());
        let observer = CommandObserver::new(CommandFilterConfig::default(), input.clone());
        (observer, input)
    }

    const NO_FRAMES: [&str; 0] = [];

    #[test]
    fn file_observer_forwards_every_kind() {
        let input = Arc::new(RecordingInput::default());
        let observer = FileChangeObserver::new(input.clone());

        for kind in [
            FileChangeKind::Create,
            FileChangeKind::Modify,
            FileChangeKind::Move,
            FileChangeKind::Delete,
        ] {
            observer.observe(&FileChangeEvent::new("/repo/a.txt", kind));
        }

        assert_eq!(input.events.lock().unwrap().len(), 4);
        assert!(input
            .events
            .lock()
            .unwrap()
            .iter()
            .all(|event| event == "file:/repo/a.txt"));
    }

    #[test]
    fn typing_command_requests_human_checkpoint() {
        let (observer, input) = command_observer();
        assert!(observer.observe("Typing", &NO_FRAMES));
        assert_eq!(*input.events.lock().unwrap(), vec!["human".to_string()]);
    }

    #[test]
    fn empty_and_noise_commands_are_ignored() {
        let (observer, input) = command_observer();
        assert_eq!(
            observer.ignore_reason("  ", &NO_FRAMES),
            Some(IgnoreReason::EmptyName)
        );
        assert_eq!(
            observer.ignore_reason("Reload From Disk", &NO_FRAMES),
            Some(IgnoreReason::NoiseCommand)
        );
        assert_eq!(
            observer.ignore_reason("Run Git-AI Checkpoint", &NO_FRAMES),
            Some(IgnoreReason::OwnCommand)
        );
        assert!(!observer.observe("", &NO_FRAMES));
        assert!(input.events.lock().unwrap().is_empty());
    }

    #[test]
    fn agent_stack_frames_suppress_command() {
        let (observer, input) = command_observer();
        let frames = vec![
            "com.intellij.openapi.command.impl.CoreCommandProcessor.executeCommand".to_string(),
            "software.aws.toolkits.jetbrains.services.amazonq.InlineChat.apply".to_string(),
        ];
        assert_eq!(
            observer.ignore_reason("Paste", &frames),
            Some(IgnoreReason::AgentStack)
        );
        assert!(!observer.observe("Paste", &frames));
        assert!(input.events.lock().unwrap().is_empty());
    }

    #[test]
    fn agent_frame_beyond_depth_is_not_inspected() {
        let (observer, _) = command_observer();
        let mut frames: Vec<String> = (0..30).map(|i| format!("host.Frame{}", i)).collect();
        frames.push("software.aws.toolkits.Late".to_string());
        assert_eq!(observer.ignore_reason("Paste", &frames), None);
    }
}
