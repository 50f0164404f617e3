use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Schedule,
    Info,
    Handoff,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Structured fields pulled out of a customer message by the language model.
/// Every field may come back empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Extraction {
    pub intent: Intent,
    #[serde(deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(deserialize_with = "lenient_string")]
    pub service: String,
    #[serde(deserialize_with = "lenient_string")]
    pub category: String,
    #[serde(deserialize_with = "lenient_string")]
    pub date: String,
    #[serde(deserialize_with = "lenient_string")]
    pub time: String,
    #[serde(deserialize_with = "lenient_string")]
    pub contact: String,
    #[serde(deserialize_with = "lenient_string")]
    pub notes: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequiredField {
    Name,
    Service,
    Category,
    Date,
    Time,
    Contact,
}

impl RequiredField {
    pub fn label(&self) -> &'static str {
        match self {
            RequiredField::Name => "your full name",
            RequiredField::Service => "the service you need",
            RequiredField::Category => "the category (Web & Apps, AI Solutions, Cloud & DevOps, Telecom - Networks & Fiber, Documentation & Improvement, IT Consulting)",
            RequiredField::Date => "the date",
            RequiredField::Time => "the time",
            RequiredField::Contact => "a phone number or e-mail",
        }
    }
}

impl Extraction {
    /// Required booking fields that are still blank, in prompt order.
    pub fn missing_fields(&self) -> Vec<RequiredField> {
        [
            (RequiredField::Name, &self.name),
            (RequiredField::Service, &self.service),
            (RequiredField::Category, &self.category),
            (RequiredField::Date, &self.date),
            (RequiredField::Time, &self.time),
            (RequiredField::Contact, &self.contact),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| field)
        .collect()
    }
}

// Models sometimes answer with null or a number where a string belongs.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_intent_string_falls_back() {
        let e: Extraction = serde_json::from_str(r#"{"intent":"cancel"}"#).unwrap();
        assert_eq!(e.intent, Intent::Unknown);
        assert_eq!(e.missing_fields().len(), 6);
    }

    #[test]
    fn test_lenient_fields() {
        let e: Extraction = serde_json::from_str(
            r#"{"intent":"schedule","name":null,"time":14,"date":" 20/08 "}"#,
        )
        .unwrap();
        assert_eq!(e.intent, Intent::Schedule);
        assert_eq!(e.name, "");
        assert_eq!(e.time, "14");
        assert_eq!(e.date, "20/08");
    }

    #[test]
    fn test_missing_fields_in_order() {
        let e = Extraction {
            intent: Intent::Schedule,
            name: "Ana".to_string(),
            service: "".to_string(),
            category: "Cloud & DevOps".to_string(),
            date: "20/08".to_string(),
            time: " ".to_string(),
            contact: "ana@example.com".to_string(),
            notes: "".to_string(),
        };
        assert_eq!(
            e.missing_fields(),
            vec![RequiredField::Service, RequiredField::Time]
        );
    }
}
