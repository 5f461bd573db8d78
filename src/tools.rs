//! Structured-extraction tool schemas
//!
//! Each task variant registers at most one function the model calls whenever it
//! has collected new information. The field sets are disjoint between tasks.

use std::collections::BTreeMap;

use crate::gemini::{FunctionDeclaration, ParameterSchema, PropertySchema, Tool};
use crate::session_config::TaskId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Integer,
    Boolean,
}

impl FieldType {
    fn as_str(&self) -> &'static str {
        match self {
            Self::String => "STRING",
            Self::Integer => "INTEGER",
            Self::Boolean => "BOOLEAN",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldType,
    pub description: &'static str,
}

const fn field(name: &'static str, description: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        kind: FieldType::String,
        description,
    }
}

/// A named function declaration with a flat property bag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolSchema {
    pub name: &'static str,
    pub description: &'static str,
    pub fields: &'static [FieldSpec],
}

/// Full intake: everything needed to set up a medication reminder.
pub const INTAKE_SCHEMA: ToolSchema = ToolSchema {
    name: "log_task1_data",
    description: "Record newly collected intake information about the user and their medication.",
    fields: &[
        field("name", "The user's name."),
        field("medication_name", "Name of the medication, spelled as confirmed by the user."),
        field("dosage", "Dose taken each time, e.g. '500 mg' or 'two tablets'."),
        field("frequency", "How often the medication is taken, e.g. 'daily'."),
        field("time", "Time(s) of day the medication is taken."),
        field("caregiver_name", "Name of the caregiver to notify, if any."),
        field("caregiver_contact", "Phone number or email of the caregiver."),
    ],
};

/// Daily check-in: whether today's dose was taken.
pub const CHECK_IN_SCHEMA: ToolSchema = ToolSchema {
    name: "log_task2_data",
    description: "Record the outcome of today's medication check-in.",
    fields: &[
        field("status", "TAKEN, SKIPPED or SNOOZED."),
        field("reminder_time", "When to remind again if the dose was not taken yet."),
    ],
};

/// Profile update: one changed field at a time.
pub const PROFILE_UPDATE_SCHEMA: ToolSchema = ToolSchema {
    name: "log_task3_data",
    description: "Record a change the user made to their saved profile.",
    fields: &[
        field("updated_field", "Which profile entry changed, e.g. 'medication time'."),
        field("new_value", "The new value, as confirmed by the user."),
        FieldSpec {
            name: "confirmed",
            kind: FieldType::Boolean,
            description: "True once the user confirmed the change when it was read back.",
        },
    ],
};

impl ToolSchema {
    /// The schema registered for a task, if the task has one.
    pub fn for_task(task: TaskId) -> Option<Self> {
        match task.get() {
            1 => Some(INTAKE_SCHEMA),
            2 => Some(CHECK_IN_SCHEMA),
            3 => Some(PROFILE_UPDATE_SCHEMA),
            _ => None,
        }
    }

    pub fn field_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|f| f.name)
    }

    pub fn declaration(&self) -> FunctionDeclaration {
        let properties = self
            .fields
            .iter()
            .map(|f| {
                (
                    f.name.to_string(),
                    PropertySchema {
                        kind: f.kind.as_str().to_string(),
                        description: f.description.to_string(),
                    },
                )
            })
            .collect::<BTreeMap<_, _>>();

        FunctionDeclaration {
            name: self.name.to_string(),
            description: self.description.to_string(),
            parameters: ParameterSchema {
                kind: "OBJECT".to_string(),
                properties,
            },
        }
    }

    /// Wrap the declaration in the `tools` entry of a setup message.
    pub fn as_tool(&self) -> Tool {
        Tool {
            function_declarations: vec![self.declaration()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_task_selection() {
        assert_eq!(ToolSchema::for_task(TaskId::new(1)), Some(INTAKE_SCHEMA));
        assert_eq!(ToolSchema::for_task(TaskId::new(2)), Some(CHECK_IN_SCHEMA));
        assert_eq!(ToolSchema::for_task(TaskId::new(3)), Some(PROFILE_UPDATE_SCHEMA));
        assert_eq!(ToolSchema::for_task(TaskId::new(9)), None);
    }

    #[test]
    fn test_check_in_fields_are_exact() {
        let fields: HashSet<_> = CHECK_IN_SCHEMA.field_names().collect();
        assert_eq!(fields, HashSet::from(["status", "reminder_time"]));
    }

    #[test]
    fn test_schemas_are_disjoint() {
        let schemas = [INTAKE_SCHEMA, CHECK_IN_SCHEMA, PROFILE_UPDATE_SCHEMA];
        let mut seen = HashSet::new();
        for schema in schemas {
            for name in schema.field_names() {
                assert!(seen.insert(name), "field {name} appears in two schemas");
            }
        }
        let names: HashSet<_> = schemas.iter().map(|s| s.name).collect();
        assert_eq!(names.len(), 3);
    }

    #[test]
    fn test_declaration_shape() {
        let tool = serde_json::to_value(CHECK_IN_SCHEMA.as_tool()).unwrap();
        let decl = &tool["functionDeclarations"][0];
        assert_eq!(decl["name"], "log_task2_data");
        assert_eq!(decl["parameters"]["type"], "OBJECT");
        assert_eq!(decl["parameters"]["properties"]["status"]["type"], "STRING");
        assert_eq!(
            decl["parameters"]["properties"].as_object().unwrap().len(),
            2
        );

        let profile = serde_json::to_value(PROFILE_UPDATE_SCHEMA.declaration()).unwrap();
        assert_eq!(profile["parameters"]["properties"]["confirmed"]["type"], "BOOLEAN");
    }
}
