//! Number format types

/// Number format for cell display
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NumberFormat {
    /// General format (default)
    #[default]
    General,

    /// Built-in format by ID
    BuiltIn(u32),

    /// Custom format string
    Custom(String),
}

impl NumberFormat {
    /// 0 - General
    pub const ID_GENERAL: u32 = 0;
    /// 14 - mm-dd-yy
    pub const ID_DATE_SHORT: u32 = 14;
    /// 22 - m/d/yy h:mm
    pub const ID_DATETIME: u32 = 22;
    /// 49 - @
    pub const ID_TEXT: u32 = 49;
    /// First id available to custom formats in a styles part
    pub const FIRST_CUSTOM_ID: u32 = 164;

    /// Create a number format from a format string
    pub fn from_string<S: Into<String>>(format: S) -> Self {
        NumberFormat::Custom(format.into())
    }

    /// Create a built-in format by ID
    pub fn from_id(id: u32) -> Self {
        if id == Self::ID_GENERAL {
            NumberFormat::General
        } else {
            NumberFormat::BuiltIn(id)
        }
    }

    /// Check if this is a date/time format
    ///
    /// Built-in ids cover the western date/time range plus the CJK locale-dependent ones.
    /// Custom codes count as dates when a date/time token appears outside quoted literals,
    /// escapes and bracketed sections (`[Red]`, `[$-409]`); elapsed-time brackets (`[h]`)
    /// count as time.
    pub fn is_date_format(&self) -> bool {
        match self {
            NumberFormat::BuiltIn(id) => is_builtin_date_id(*id),
            NumberFormat::Custom(s) => is_date_format_code(s),
            NumberFormat::General => false,
        }
    }
}

fn is_builtin_date_id(id: u32) -> bool {
    matches!(id, 14..=22 | 27..=36 | 45..=47 | 50..=58)
}

fn is_date_format_code(code: &str) -> bool {
    // Only the positive section decides
    let section = code.split(';').next().unwrap_or("");
    if section.eq_ignore_ascii_case("general") {
        return false;
    }

    let mut chars = section.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' => {
                for q in chars.by_ref() {
                    if q == '"' {
                        break;
                    }
                }
            }
            '\\' | '_' | '*' => {
                chars.next();
            }
            '[' => {
                let mut inner = String::new();
                for b in chars.by_ref() {
                    if b == ']' {
                        break;
                    }
                    inner.push(b);
                }
                let inner = inner.to_ascii_lowercase();
                if !inner.is_empty() && inner.chars().all(|ch| matches!(ch, 'h' | 'm' | 's')) {
                    return true;
                }
            }
            'y' | 'Y' | 'd' | 'D' | 'h' | 'H' | 's' | 'S' | 'm' | 'M' => return true,
            _ => {}
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_date_ids() {
        assert!(NumberFormat::from_id(14).is_date_format());
        assert!(NumberFormat::from_id(22).is_date_format());
        assert!(NumberFormat::from_id(47).is_date_format());
        assert!(!NumberFormat::from_id(0).is_date_format());
        assert!(!NumberFormat::from_id(4).is_date_format());
        assert!(!NumberFormat::from_id(49).is_date_format());
    }

    #[test]
    fn test_custom_date_codes() {
        assert!(NumberFormat::from_string("yyyy-mm-dd").is_date_format());
        assert!(NumberFormat::from_string("[$-409]d-mmm-yy;@").is_date_format());
        assert!(NumberFormat::from_string("[h]:mm:ss").is_date_format());
        assert!(NumberFormat::from_string("hh:mm AM/PM").is_date_format());
    }

    #[test]
    fn test_custom_non_date_codes() {
        assert!(!NumberFormat::from_string("General").is_date_format());
        assert!(!NumberFormat::from_string("0.00").is_date_format());
        assert!(!NumberFormat::from_string("#,##0;[Red]-#,##0").is_date_format());
        assert!(!NumberFormat::from_string("0.0\" days\"").is_date_format());
        assert!(!NumberFormat::from_string("@").is_date_format());
    }
}
