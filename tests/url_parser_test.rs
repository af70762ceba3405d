//! Tests for share link / ID extraction.

use folder_drive::url_parser::extract_id;

mod share_links {
    use super::*;

    #[test]
    fn folder_links() {
        for url in [
            "https://drive.google.com/drive/folders/1abc123XYZ-_def",
            "https://drive.google.com/drive/u/0/folders/1abc123XYZ-_def",
            "https://drive.google.com/drive/u/3/folders/1abc123XYZ-_def?usp=sharing",
            "http://drive.google.com/drive/folders/1abc123XYZ-_def",
        ] {
            assert_eq!(extract_id(url).unwrap(), "1abc123XYZ-_def", "{url}");
        }
    }

    #[test]
    fn file_links() {
        for url in [
            "https://drive.google.com/file/d/1abc123XYZ/view",
            "https://drive.google.com/file/d/1abc123XYZ/view?usp=sharing",
            "https://drive.google.com/file/d/1abc123XYZ",
            "https://docs.google.com/document/d/1abc123XYZ/edit",
        ] {
            assert_eq!(extract_id(url).unwrap(), "1abc123XYZ", "{url}");
        }
    }

    #[test]
    fn query_links() {
        assert_eq!(
            extract_id("https://drive.google.com/open?id=1abc123XYZ").unwrap(),
            "1abc123XYZ"
        );
        assert_eq!(
            extract_id("https://drive.google.com/uc?id=1abc123XYZ&export=download").unwrap(),
            "1abc123XYZ"
        );
    }
}

mod raw_ids {
    use super::*;

    #[test]
    fn accepted_characters() {
        assert_eq!(extract_id("1abc123XYZ").unwrap(), "1abc123XYZ");
        assert_eq!(extract_id("abc-123_XYZ").unwrap(), "abc-123_XYZ");
    }

    #[test]
    fn surrounding_whitespace_is_trimmed() {
        assert_eq!(extract_id("  1abc123XYZ  ").unwrap(), "1abc123XYZ");
        assert_eq!(extract_id("\t1abc123XYZ\n").unwrap(), "1abc123XYZ");
    }
}

mod invalid_inputs {
    use super::*;

    #[test]
    fn empty_or_blank() {
        assert!(extract_id("").is_err());
        assert!(extract_id("\t\n").is_err());
    }

    #[test]
    fn links_without_an_id() {
        assert!(extract_id("https://drive.google.com/").is_err());
        assert!(extract_id("https://drive.google.com/drive/").is_err());
        assert!(extract_id("https://example.com/folder/123").is_err());
    }

    #[test]
    fn invalid_characters() {
        assert!(extract_id("abc 123").is_err());
        assert!(extract_id("abc/123").is_err());
        assert!(extract_id("abc@123").is_err());
    }
}
