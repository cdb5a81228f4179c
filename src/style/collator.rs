//! Locale-aware string comparison used by `collator` and string comparisons.

use std::cmp::Ordering;

/// String comparison options.
///
/// Case folding uses Unicode lowercase mapping. Diacritic folding covers the
/// Latin-1 Supplement and Latin Extended-A ranges, which is what map labels
/// overwhelmingly contain.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Collator {
    pub case_sensitive: bool,
    pub diacritic_sensitive: bool,
    pub locale: Option<String>,
}

impl Collator {
    pub fn new(case_sensitive: bool, diacritic_sensitive: bool, locale: Option<String>) -> Self {
        Self {
            case_sensitive,
            diacritic_sensitive,
            locale,
        }
    }

    pub fn compare(&self, lhs: &str, rhs: &str) -> Ordering {
        self.fold(lhs).cmp(&self.fold(rhs))
    }

    /// Locale reported by `resolved-locale`.
    pub fn resolved_locale(&self) -> String {
        match &self.locale {
            Some(locale) if !locale.is_empty() => locale.clone(),
            _ => "en".to_string(),
        }
    }

    fn fold(&self, s: &str) -> String {
        let mut out = String::with_capacity(s.len());
        for ch in s.chars() {
            let base = if self.diacritic_sensitive {
                ch
            } else {
                strip_diacritic(ch)
            };
            if self.case_sensitive {
                out.push(base);
            } else {
                out.extend(base.to_lowercase());
            }
        }
        out
    }
}

fn strip_diacritic(ch: char) -> char {
    match ch {
        'À'..='Å' | 'Ā' | 'Ă' | 'Ą' => 'A',
        'à'..='å' | 'ā' | 'ă' | 'ą' => 'a',
        'Ç' | 'Ć' | 'Ĉ' | 'Ċ' | 'Č' => 'C',
        'ç' | 'ć' | 'ĉ' | 'ċ' | 'č' => 'c',
        'Ď' | 'Đ' => 'D',
        'ď' | 'đ' => 'd',
        'È'..='Ë' | 'Ē' | 'Ĕ' | 'Ė' | 'Ę' | 'Ě' => 'E',
        'è'..='ë' | 'ē' | 'ĕ' | 'ė' | 'ę' | 'ě' => 'e',
        'Ĝ' | 'Ğ' | 'Ġ' | 'Ģ' => 'G',
        'ĝ' | 'ğ' | 'ġ' | 'ģ' => 'g',
        'Ĥ' | 'Ħ' => 'H',
        'ĥ' | 'ħ' => 'h',
        'Ì'..='Ï' | 'Ĩ' | 'Ī' | 'Ĭ' | 'Į' | 'İ' => 'I',
        'ì'..='ï' | 'ĩ' | 'ī' | 'ĭ' | 'į' | 'ı' => 'i',
        'Ĵ' => 'J',
        'ĵ' => 'j',
        'Ķ' => 'K',
        'ķ' => 'k',
        'Ĺ' | 'Ļ' | 'Ľ' | 'Ŀ' | 'Ł' => 'L',
        'ĺ' | 'ļ' | 'ľ' | 'ŀ' | 'ł' => 'l',
        'Ñ' | 'Ń' | 'Ņ' | 'Ň' => 'N',
        'ñ' | 'ń' | 'ņ' | 'ň' => 'n',
        'Ò'..='Ö' | 'Ø' | 'Ō' | 'Ŏ' | 'Ő' => 'O',
        'ò'..='ö' | 'ø' | 'ō' | 'ŏ' | 'ő' => 'o',
        'Ŕ' | 'Ŗ' | 'Ř' => 'R',
        'ŕ' | 'ŗ' | 'ř' => 'r',
        'Ś' | 'Ŝ' | 'Ş' | 'Š' => 'S',
        'ś' | 'ŝ' | 'ş' | 'š' => 's',
        'Ţ' | 'Ť' | 'Ŧ' => 'T',
        'ţ' | 'ť' | 'ŧ' => 't',
        'Ù'..='Ü' | 'Ũ' | 'Ū' | 'Ŭ' | 'Ů' | 'Ű' | 'Ų' => 'U',
        'ù'..='ü' | 'ũ' | 'ū' | 'ŭ' | 'ů' | 'ű' | 'ų' => 'u',
        'Ŵ' => 'W',
        'ŵ' => 'w',
        'Ý' | 'Ŷ' | 'Ÿ' => 'Y',
        'ý' | 'ÿ' | 'ŷ' => 'y',
        'Ź' | 'Ż' | 'Ž' => 'Z',
        'ź' | 'ż' | 'ž' => 'z',
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive_by_default() {
        let collator = Collator::default();
        assert_eq!(collator.compare("Hello", "hello"), Ordering::Equal);
        assert_eq!(collator.compare("a", "B"), Ordering::Less);
    }

    #[test]
    fn test_diacritic_folding() {
        let insensitive = Collator::default();
        assert_eq!(insensitive.compare("Café", "cafe"), Ordering::Equal);
        let sensitive = Collator::new(false, true, None);
        assert_ne!(sensitive.compare("Café", "cafe"), Ordering::Equal);
    }

    #[test]
    fn test_case_sensitive() {
        let collator = Collator::new(true, false, Some("fr".into()));
        assert_ne!(collator.compare("A", "a"), Ordering::Equal);
        assert_eq!(collator.resolved_locale(), "fr");
        assert_eq!(Collator::default().resolved_locale(), "en");
    }
}
