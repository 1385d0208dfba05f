use serde::{Deserialize, Serialize};

/// Ways a planned step can describe the element it should act on.
///
/// Descriptors are deliberately loose. Exact selectors rarely survive contact
/// with a second application, so a step carries the most portable description
/// the planner has and the executor decides how to resolve it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetDescriptor {
    /// Match by accessibility role and optional accessible name
    Role { role: String, name: Option<String> },
    /// Match by visible text content
    Text(String),
    /// Match by form-label text; resolves to the control the label points at
    Label(String),
    /// A CSS-ish selector hint from the planner, best effort only
    Hint(String),
    /// An absolute page coordinate, for when nothing structural is known
    Point { x: f64, y: f64 },
    /// A URL, for navigation steps
    Url(String),
    /// A descriptor string that could not be parsed, with the reason
    Invalid(String),
}

impl TargetDescriptor {
    /// The text needle the visual layer can search an image for, if any.
    pub fn visual_needle(&self) -> Option<&str> {
        match self {
            TargetDescriptor::Text(s) | TargetDescriptor::Label(s) => Some(s),
            TargetDescriptor::Role { name: Some(n), .. } => Some(n),
            _ => None,
        }
    }
}

impl std::fmt::Display for TargetDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetDescriptor::Role { role, name: Some(name) } => {
                write!(f, "role:{role}|name:{name}")
            }
            TargetDescriptor::Role { role, name: None } => write!(f, "role:{role}"),
            TargetDescriptor::Text(s) => write!(f, "text:{s}"),
            TargetDescriptor::Label(s) => write!(f, "label:{s}"),
            TargetDescriptor::Hint(s) => write!(f, "hint:{s}"),
            TargetDescriptor::Point { x, y } => write!(f, "point:{x},{y}"),
            TargetDescriptor::Url(s) => write!(f, "url:{s}"),
            TargetDescriptor::Invalid(reason) => write!(f, "invalid:{reason}"),
        }
    }
}

impl From<&str> for TargetDescriptor {
    fn from(s: &str) -> Self {
        let s = s.trim();

        // role:button|name:Create (preferred precise format)
        if s.contains('|') {
            let parts: Vec<&str> = s.split('|').collect();
            if parts.len() >= 2 {
                let role_part = parts[0].trim();
                let name_part = parts[1].trim();

                let role = role_part
                    .strip_prefix("role:")
                    .unwrap_or(role_part)
                    .to_string();
                let name = name_part
                    .strip_prefix("name:")
                    .unwrap_or(name_part)
                    .to_string();

                return TargetDescriptor::Role {
                    role,
                    name: Some(name),
                };
            }
        }

        match s {
            _ if s.starts_with("role:") => TargetDescriptor::Role {
                role: s[5..].to_string(),
                name: None,
            },
            _ if s.starts_with("text:") => TargetDescriptor::Text(s[5..].to_string()),
            _ if s.to_lowercase().starts_with("label:") => {
                TargetDescriptor::Label(s[6..].to_string())
            }
            _ if s.to_lowercase().starts_with("hint:") => {
                TargetDescriptor::Hint(s[5..].to_string())
            }
            _ if s.to_lowercase().starts_with("css:") => {
                TargetDescriptor::Hint(s[4..].to_string())
            }
            _ if s.to_lowercase().starts_with("point:") || s.to_lowercase().starts_with("pos:") => {
                let coords = s.splitn(2, ':').nth(1).unwrap_or("");
                let parts: Vec<&str> = coords.split(',').map(|p| p.trim()).collect();
                if parts.len() == 2 {
                    match (parts[0].parse::<f64>(), parts[1].parse::<f64>()) {
                        (Ok(x), Ok(y)) => TargetDescriptor::Point { x, y },
                        _ => TargetDescriptor::Invalid(format!(
                            "point coordinates must be numeric: '{coords}'"
                        )),
                    }
                } else {
                    TargetDescriptor::Invalid(format!(
                        "point descriptor needs 'x,y' coordinates: '{coords}'"
                    ))
                }
            }
            _ if s.starts_with("url:") => TargetDescriptor::Url(s[4..].to_string()),
            _ if s.starts_with("http://") || s.starts_with("https://") => {
                TargetDescriptor::Url(s.to_string())
            }
            // CSS-looking strings become hints
            _ if s.starts_with('#') || s.starts_with('.') || s.starts_with('[') => {
                TargetDescriptor::Hint(s.to_string())
            }
            "" => TargetDescriptor::Invalid("empty target descriptor".to_string()),
            // A bare word is treated as visible text, the most portable form
            _ => TargetDescriptor::Text(s.to_string()),
        }
    }
}

impl From<String> for TargetDescriptor {
    fn from(s: String) -> Self {
        TargetDescriptor::from(s.as_str())
    }
}
