use uuid::Uuid;

/// Time-ordered identifiers keep `id DESC` a usable tie-breaker for `created_at DESC`.
pub fn new_uuid_v7() -> String {
    Uuid::now_v7().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_parse() {
        let a = new_uuid_v7();
        let b = new_uuid_v7();
        assert_ne!(a, b);
        assert_eq!(Uuid::parse_str(&a).expect("uuid").get_version_num(), 7);
    }
}
