//! Recipient address normalization.
//!
//! Callers may hand in a raw phone number ("0812-345 678") or a fully
//! qualified transport address ("62812345678@c.us"). Qualified addresses pass
//! through untouched; everything else is reduced to its digits and the
//! transport suffix is appended.

/// Domain suffix the transport uses for one-to-one chats.
pub const DEFAULT_ADDRESS_SUFFIX: &str = "@c.us";

/// An empty `suffix` never marks an address as qualified.
pub fn normalize_address(raw: &str, suffix: &str) -> String {
    if !suffix.is_empty() && raw.contains(suffix) {
        return raw.to_string();
    }
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    format!("{digits}{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualified_address_is_verbatim() {
        assert_eq!(
            normalize_address("62812@c.us", DEFAULT_ADDRESS_SUFFIX),
            "62812@c.us"
        );
    }

    #[test]
    fn raw_number_is_stripped_and_suffixed() {
        assert_eq!(
            normalize_address("+62 812-345 (678)", DEFAULT_ADDRESS_SUFFIX),
            "62812345678@c.us"
        );
    }

    #[test]
    fn custom_suffix() {
        assert_eq!(normalize_address("0812", "@s.test"), "0812@s.test");
        assert_eq!(normalize_address("0812@s.test", "@s.test"), "0812@s.test");
    }

    #[test]
    fn empty_suffix_still_strips() {
        assert_eq!(normalize_address("+62 812-345", ""), "62812345");
    }

    #[test]
    fn non_digit_input_keeps_only_suffix() {
        assert_eq!(normalize_address("abc", DEFAULT_ADDRESS_SUFFIX), "@c.us");
    }
}
