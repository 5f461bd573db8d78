//! Per-session conversational configuration
//!
//! A session is selected by a small task id. The resolver turns that id into
//! the system instruction (persona, current time, flow definition, extraction
//! instructions, profile, fallback guidance), the tool schema the model may
//! call, and the synthetic user turn that starts the conversation.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RelayError, Result};
use crate::tools::ToolSchema;

const PERSONA: &str = "You are Cheesecake, a friendly medication reminder assistant. \
You are talking with the user by voice, so keep every reply short, warm and conversational.";

const FALLBACK_GUIDANCE: &str = "If you don't hear a response or it doesn't make sense, repeat the question. \
Ask the user to spell things out if you don't know the spelling.";

const GENERIC_TRIGGER: &str = "Hello! Please start the conversation by greeting me.";

/// Identifier of a conversation flow variant. Always at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u32);

impl TaskId {
    pub const DEFAULT: TaskId = TaskId(1);

    pub fn new(id: u32) -> Self {
        if id == 0 {
            Self::DEFAULT
        } else {
            Self(id)
        }
    }

    /// Parse a connection parameter, falling back to the default task.
    pub fn from_param(param: Option<&str>) -> Self {
        param
            .and_then(|raw| raw.trim().parse::<u32>().ok())
            .map(Self::new)
            .unwrap_or(Self::DEFAULT)
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Source of flow-definition documents.
pub trait FlowStore: Send + Sync {
    fn load(&self, task: TaskId) -> Result<String>;
}

/// Reads `task<N>.mmd` files from a directory.
#[derive(Debug, Clone)]
pub struct FsFlowStore {
    dir: PathBuf,
}

impl FsFlowStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, task: TaskId) -> PathBuf {
        self.dir.join(format!("task{}.mmd", task))
    }
}

impl FlowStore for FsFlowStore {
    fn load(&self, task: TaskId) -> Result<String> {
        let path = self.path_for(task);
        std::fs::read_to_string(&path).map_err(|e| {
            debug!("Failed to read flow {}: {}", path.display(), e);
            RelayError::FlowNotFound {
                task,
                location: path.display().to_string(),
            }
        })
    }
}

impl FlowStore for HashMap<TaskId, String> {
    fn load(&self, task: TaskId) -> Result<String> {
        self.get(&task).cloned().ok_or(RelayError::FlowNotFound {
            task,
            location: "in-memory flow table".to_string(),
        })
    }
}

/// Profile state the assistant already knows about the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub medication_name: String,
    pub dosage: String,
    pub frequency: String,
    pub time: String,
    pub caregiver_name: String,
    pub caregiver_contact: String,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            name: "Margaret".to_string(),
            medication_name: "Lisinopril".to_string(),
            dosage: "10 mg".to_string(),
            frequency: "daily".to_string(),
            time: "8:00 AM".to_string(),
            caregiver_name: "David".to_string(),
            caregiver_contact: "555-0142".to_string(),
        }
    }
}

impl Profile {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            RelayError::Configuration(format!("PROFILE_PATH={}: {e}", path.display()))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            RelayError::Configuration(format!("invalid profile {}: {}", path.display(), e))
        })
    }

    fn describe(&self) -> String {
        format!(
            "NAME: {}\nMEDICATION: {}\nDOSAGE: {}\nFREQUENCY: {}\nTIME: {}\nCAREGIVER: {} ({})",
            self.name,
            self.medication_name,
            self.dosage,
            self.frequency,
            self.time,
            self.caregiver_name,
            self.caregiver_contact
        )
    }

    fn scripted_greeting(&self) -> String {
        format!(
            "Say exactly this to start: \"Hi {}, this is Cheesecake. I'd like to go over your saved \
             medication details to make sure they're still right. Is now a good time?\"",
            self.name
        )
    }
}

/// Everything the relay injects into a session at setup time.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub system_instruction: String,
    pub tool_schema: Option<ToolSchema>,
    pub initial_trigger: String,
}

pub struct SessionConfigResolver {
    flows: Box<dyn FlowStore>,
    profile: Profile,
    reference_zone: Tz,
}

impl SessionConfigResolver {
    pub fn new(flows: impl FlowStore + 'static, profile: Profile, reference_zone: Tz) -> Self {
        Self {
            flows: Box::new(flows),
            profile,
            reference_zone,
        }
    }

    /// Build the configuration for `task` as of `now`.
    pub fn resolve(&self, task: TaskId, now: DateTime<Utc>) -> Result<SessionConfig> {
        let flow = self.flows.load(task)?;
        let tool_schema = ToolSchema::for_task(task);

        let mut sections = vec![
            PERSONA.to_string(),
            self.time_statement(now),
            format!(
                "You must strictly follow the flow described in this mermaid flowchart:\n\n{}",
                flow.trim_end()
            ),
        ];
        if let Some(schema) = &tool_schema {
            sections.push(extraction_instructions(task, schema));
        }
        if is_profile_update(task) {
            sections.push(format!(
                "The user's saved profile is:\n{}",
                self.profile.describe()
            ));
        }
        sections.push(FALLBACK_GUIDANCE.to_string());

        let initial_trigger = if is_profile_update(task) {
            self.profile.scripted_greeting()
        } else {
            GENERIC_TRIGGER.to_string()
        };

        Ok(SessionConfig {
            system_instruction: sections.join("\n\n"),
            tool_schema,
            initial_trigger,
        })
    }

    fn time_statement(&self, now: DateTime<Utc>) -> String {
        let local = now.with_timezone(&self.reference_zone);
        format!(
            "The current date and time is {} {} (UTC{}).",
            local.format("%A, %B %-d, %Y at %-I:%M %p"),
            local.format("%Z"),
            local.format("%:z")
        )
    }
}

fn is_profile_update(task: TaskId) -> bool {
    task.get() == 3
}

fn extraction_instructions(task: TaskId, schema: &ToolSchema) -> String {
    let fields = schema.field_names().collect::<Vec<_>>().join(", ");
    let when = match task.get() {
        1 => "whenever you collect new intake information",
        2 => "as soon as the user tells you whether they took their medication",
        _ => "each time the user confirms a change to their profile",
    };
    format!(
        "INSTRUCTIONS:\nThe system needs to record the collected information. Call the `{}` function {} \
         (fields: {}). Only include the fields you actually learned. Keep talking to the user normally \
         after calling it; never read the function call aloud.",
        schema.name, when, fields
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn resolver() -> SessionConfigResolver {
        let flows: HashMap<TaskId, String> = [
            (TaskId::new(1), "flowchart TD\n  A[Intake]".to_string()),
            (TaskId::new(2), "flowchart TD\n  A[Check-in]".to_string()),
            (TaskId::new(3), "flowchart TD\n  A[Profile]".to_string()),
            (TaskId::new(4), "flowchart TD\n  A[Chat]".to_string()),
        ]
        .into_iter()
        .collect();
        SessionConfigResolver::new(
            flows,
            Profile::default(),
            chrono_tz::America::New_York,
        )
    }

    fn noon_utc() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 17, 5, 0).unwrap()
    }

    fn time_line(config: &SessionConfig) -> &str {
        config
            .system_instruction
            .lines()
            .find(|line| line.starts_with("The current date and time"))
            .unwrap()
    }

    #[test]
    fn test_task_id_parsing() {
        assert_eq!(TaskId::from_param(Some("2")), TaskId::new(2));
        assert_eq!(TaskId::from_param(Some(" 3 ")), TaskId::new(3));
        assert_eq!(TaskId::from_param(None), TaskId::DEFAULT);
        assert_eq!(TaskId::from_param(Some("abc")), TaskId::DEFAULT);
        assert_eq!(TaskId::from_param(Some("-2")), TaskId::DEFAULT);
        assert_eq!(TaskId::from_param(Some("0")), TaskId::DEFAULT);
    }

    #[test]
    fn test_instruction_sections() {
        let config = resolver().resolve(TaskId::new(2), noon_utc()).unwrap();
        let text = &config.system_instruction;

        assert!(text.starts_with("You are Cheesecake"));
        assert!(text.contains("A[Check-in]"));
        assert!(text.contains("`log_task2_data`"));
        assert!(text.contains("spell things out"));
        assert!(!text.contains("saved profile"));
        assert_eq!(config.tool_schema.unwrap().name, "log_task2_data");
        assert_eq!(config.initial_trigger, GENERIC_TRIGGER);
    }

    #[test]
    fn test_time_statement_follows_daylight_saving() {
        let r = resolver();
        let summer = r.resolve(TaskId::new(1), noon_utc()).unwrap();
        assert_eq!(
            time_line(&summer),
            "The current date and time is Sunday, October 18, 2026 at 1:05 PM EDT (UTC-04:00)."
        );

        let winter = Utc.with_ymd_and_hms(2026, 1, 15, 17, 5, 0).unwrap();
        let winter = r.resolve(TaskId::new(1), winter).unwrap();
        assert_eq!(
            time_line(&winter),
            "The current date and time is Thursday, January 15, 2026 at 12:05 PM EST (UTC-05:00)."
        );
    }

    #[test]
    fn test_missing_profile_file_is_configuration_error() {
        let err = Profile::from_file(Path::new("/nonexistent/profile.json")).unwrap_err();
        assert!(matches!(err, RelayError::Configuration(_)));
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
    }

    #[test]
    fn test_profile_update_uses_script() {
        let config = resolver().resolve(TaskId::new(3), noon_utc()).unwrap();
        assert!(config.system_instruction.contains("NAME: Margaret"));
        assert!(config.initial_trigger.contains("Hi Margaret, this is Cheesecake."));
        assert_eq!(config.tool_schema.unwrap().name, "log_task3_data");
    }

    #[test]
    fn test_task_without_schema() {
        let config = resolver().resolve(TaskId::new(4), noon_utc()).unwrap();
        assert!(config.tool_schema.is_none());
        assert!(!config.system_instruction.contains("INSTRUCTIONS:"));
    }

    #[test]
    fn test_missing_flow_fails_closed() {
        let err = resolver().resolve(TaskId::new(8), noon_utc()).unwrap_err();
        assert!(matches!(err, RelayError::FlowNotFound { .. }));
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let r = resolver();
        let a = r.resolve(TaskId::new(1), noon_utc()).unwrap();
        let b = r.resolve(TaskId::new(1), noon_utc()).unwrap();
        assert_eq!(a.system_instruction, b.system_instruction);
        assert_eq!(a.initial_trigger, b.initial_trigger);
    }

    #[test]
    fn test_fs_store_reports_path() {
        let store = FsFlowStore::new("/nonexistent/flows");
        match store.load(TaskId::new(2)).unwrap_err() {
            RelayError::FlowNotFound { task, location } => {
                assert_eq!(task, TaskId::new(2));
                assert!(location.ends_with("task2.mmd"));
            }
            other => panic!("Unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_bundled_flows_exist() {
        let store = FsFlowStore::new(concat!(env!("CARGO_MANIFEST_DIR"), "/flows"));
        for id in 1..=3 {
            assert!(store.load(TaskId::new(id)).is_ok(), "missing flow for task {id}");
        }
    }
}
