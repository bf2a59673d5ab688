// form.rs — Ticket creation forms and their submissions.
//
// Normal and gang tickets are opened through a four-field form; support
// tickets have no form at all. The submission is captured once, in field
// order, and never edited afterwards.

use serde::{Deserialize, Serialize};

use crate::error::TicketError;

/// One input of a creation form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSpec {
    /// Field name as stored on the ticket and shown in the ticket embed.
    pub key: String,
    /// Prompt shown to the requester.
    pub label: String,
    pub required: bool,
    /// Maximum length in characters, if bounded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_len: Option<usize>,
    /// Multi-line input.
    #[serde(default)]
    pub paragraph: bool,
}

impl InputSpec {
    fn short(key: &str, label: &str) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
            required: true,
            max_len: None,
            paragraph: false,
        }
    }
}

/// A creation form: title plus ordered inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormSpec {
    pub title: String,
    pub inputs: Vec<InputSpec>,
}

impl FormSpec {
    /// The form used by normal and gang tickets.
    pub fn incident_report() -> Self {
        let mut title = InputSpec::short("Title", "Title");
        title.max_len = Some(80);
        let mut explanation = InputSpec::short("Explanation", "Explanation");
        explanation.paragraph = true;

        Self {
            title: "Create a Support Ticket".to_string(),
            inputs: vec![
                title,
                InputSpec::short("POV", "Do you have POV?"),
                InputSpec::short("Time", "Time of event"),
                explanation,
            ],
        }
    }

    /// Check a submission against this form.
    ///
    /// Required inputs must be present and non-blank, bounded inputs must
    /// fit, and unknown keys are rejected so nothing unexpected lands in the
    /// ticket embed.
    pub fn validate(&self, fields: &FormFields) -> Result<(), TicketError> {
        for field in fields.iter() {
            if !self.inputs.iter().any(|input| input.key == field.name) {
                return Err(TicketError::InvalidForm(format!(
                    "unexpected field '{}'",
                    field.name
                )));
            }
        }

        for input in &self.inputs {
            match fields.get(&input.key) {
                Some(value) if !value.trim().is_empty() => {
                    if let Some(max) = input.max_len {
                        if value.chars().count() > max {
                            return Err(TicketError::InvalidForm(format!(
                                "'{}' is longer than {} characters",
                                input.key, max
                            )));
                        }
                    }
                }
                _ if input.required => {
                    return Err(TicketError::InvalidForm(format!(
                        "'{}' is required",
                        input.key
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// A single submitted value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormField {
    pub name: String,
    pub value: String,
}

/// Ordered field name → value mapping captured at ticket creation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormFields(Vec<FormField>);

impl FormFields {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Append a field and return self (builder pattern).
    ///
    /// A repeated name replaces the earlier value in place, keeping the
    /// original position.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|f| f.name == name) {
            Some(existing) => existing.value = value,
            None => self.0.push(FormField { name, value }),
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &FormField> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FormFields {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(FormFields::new(), |fields, (k, v)| fields.with(k, v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> FormFields {
        FormFields::new()
            .with("Title", "Car stolen at the docks")
            .with("POV", "yes")
            .with("Time", "21:40")
            .with("Explanation", "Someone drove off with it.")
    }

    #[test]
    fn complete_submission_passes() {
        FormSpec::incident_report().validate(&complete()).unwrap();
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let fields: FormFields = [("Title", "x"), ("POV", "no"), ("Time", "now")]
            .into_iter()
            .collect();
        let err = FormSpec::incident_report().validate(&fields).unwrap_err();
        assert!(err.to_string().contains("Explanation"));
    }

    #[test]
    fn blank_value_counts_as_missing() {
        let fields = complete().with("POV", "   ");
        assert!(FormSpec::incident_report().validate(&fields).is_err());
    }

    #[test]
    fn title_length_is_bounded() {
        let fields = complete().with("Title", "x".repeat(81));
        let err = FormSpec::incident_report().validate(&fields).unwrap_err();
        assert!(err.to_string().contains("80"));
    }

    #[test]
    fn unknown_field_is_rejected() {
        let fields = complete().with("Bribe", "$$$");
        assert!(FormSpec::incident_report().validate(&fields).is_err());
    }

    #[test]
    fn fields_keep_submission_order() {
        let fields = complete();
        let names: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["Title", "POV", "Time", "Explanation"]);
    }
}
