//! Query normalization.
//!
//! The normalized key is the only identity the correction store knows about,
//! so the write path and every read path must go through [`normalize`].

/// Normalizes a raw query into a lookup key.
///
/// Latin letters are lowercased, the ideographic space becomes an ASCII space,
/// punctuation variants collapse to one representative each, and surrounding
/// whitespace is trimmed. The transform is total and idempotent.
///
/// ```
/// use namecascade::normalize;
///
/// assert_eq!(normalize("　ＡＢＣ Trading　"), "ＡＢＣ trading");
/// assert_eq!(normalize("セブン･イレブン"), "セブン・イレブン");
/// let once = normalize(" Foo–Bar ");
/// assert_eq!(normalize(&once), once);
/// ```
#[must_use]
pub fn normalize(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match unify(c) {
            Some(mapped) => out.push(mapped),
            None if is_latin_letter(c) => out.extend(c.to_lowercase()),
            None => out.push(c),
        }
    }

    let trimmed = out.trim();
    if trimmed.len() == out.len() {
        out
    } else {
        trimmed.to_string()
    }
}

/// Maps punctuation and space variants to their representative.
///
/// Every representative maps to itself, which keeps [`normalize`] idempotent.
const fn unify(c: char) -> Option<char> {
    let mapped = match c {
        '\u{3000}' => ' ',
        '\u{00B7}' | '\u{2022}' | '\u{2027}' | '\u{FF65}' => '・',
        '\u{2010}'..='\u{2015}' | '\u{2212}' | '\u{FF0D}' => '-',
        '\u{FF06}' => '&',
        '\u{FF0C}' => ',',
        '\u{FF0E}' => '.',
        '\u{FF08}' => '(',
        '\u{FF09}' => ')',
        '\u{FF01}' => '!',
        '\u{FF1F}' => '?',
        '\u{FF0F}' => '/',
        '\u{FF1A}' => ':',
        '\u{2018}' | '\u{2019}' | '\u{FF07}' => '\'',
        '\u{201C}' | '\u{201D}' | '\u{FF02}' => '"',
        _ => return None,
    };
    Some(mapped)
}

/// Basic Latin, Latin-1 Supplement and Latin Extended-A/B letters.
fn is_latin_letter(c: char) -> bool {
    c.is_ascii_alphabetic() || (('\u{00C0}'..='\u{024F}').contains(&c) && c.is_alphabetic())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_maps_to_empty() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize(" \u{3000} "), "");
    }

    #[test]
    fn test_latin_case_folding() {
        assert_eq!(normalize("KDDI"), "kddi");
        assert_eq!(normalize("Société ÉCOLE"), "société école");
    }

    #[test]
    fn test_non_latin_scripts_untouched() {
        // Full-width Latin and Greek are outside the folded ranges.
        assert_eq!(normalize("ＮＴＴ"), "ＮＴＴ");
        assert_eq!(normalize("ΑΒΓ"), "ΑΒΓ");
        assert_eq!(normalize("トヨタ"), "トヨタ");
    }

    #[test]
    fn test_full_width_space_collapses() {
        assert_eq!(normalize("三菱\u{3000}UFJ"), "三菱 ufj");
    }

    #[test]
    fn test_punctuation_unified() {
        assert_eq!(normalize("セブン\u{FF65}イレブン"), "セブン・イレブン");
        assert_eq!(normalize("A\u{2013}B"), "a-b");
        assert_eq!(normalize("P\u{FF06}G"), "p&g");
        assert_eq!(normalize("McDonald\u{2019}s"), "mcdonald's");
    }

    #[test]
    fn test_prolonged_sound_mark_is_not_a_dash() {
        assert_eq!(normalize("スーパー"), "スーパー");
    }

    #[test]
    fn test_idempotent_over_samples() {
        let samples = [
            "",
            "  Acme\u{3000}Trading ",
            "株式会社テスト・商事",
            "ÀÉÎ\u{2014}x\u{FF0F}y",
            "İstanbul Holding",
            "\u{201C}Quoted\u{201D} Co.",
            "ＡＢＣ\u{FF0E}",
        ];
        for s in samples {
            let once = normalize(s);
            assert_eq!(normalize(&once), once, "not idempotent for {s:?}");
        }
    }

    #[test]
    fn test_interior_whitespace_preserved() {
        assert_eq!(normalize("a  b"), "a  b");
    }
}
