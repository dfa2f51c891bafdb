//! Submission parameters shared by every task-producing endpoint.

use serde::{Deserialize, Deserializer, Serialize};

/// Optional knobs a client may pass alongside any task submission.
///
/// They may arrive in the query string, in a JSON body, or both; see
/// [`SubmitParams::overlay`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitParams {
	/// Id of a still-running task the new task must wait for.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub after_running_task: Option<String>,
	/// Run the task inline and answer with its result instead of a task id.
	#[serde(default, deserialize_with = "deserialize_flag")]
	pub force_immediate_execution: bool,
}

impl SubmitParams {
	/// Merges `other` over `self`; values present in `other` win.
	pub fn overlay(self, other: SubmitParams) -> SubmitParams {
		SubmitParams {
			after_running_task: other.after_running_task.or(self.after_running_task),
			force_immediate_execution: other.force_immediate_execution || self.force_immediate_execution,
		}
	}
}

/// Accepts `true`, `"true"`, and `"1"`; anything else is false.
fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
	D: Deserializer<'de>,
{
	#[derive(Deserialize)]
	#[serde(untagged)]
	enum Flag {
		Bool(bool),
		Text(String),
	}

	Ok(match Option::<Flag>::deserialize(deserializer)? {
		Some(Flag::Bool(value)) => value,
		Some(Flag::Text(text)) => matches!(text.as_str(), "true" | "1"),
		None => false,
	})
}
