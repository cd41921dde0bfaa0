use dsvc_core::dsref::{is_valid_name, parse, parse_human_friendly, ParseError, Ref};

const HASH: &str = "QmYCvbfNbCwFR45HiNP45rwJgvatpiW38D961L5qAhUM5Y";

#[test]
fn parsed_refs_render_back_to_the_same_ref() {
    let cases = [
        "peer/dataset".to_string(),
        "peer/my-data_2".to_string(),
        format!("peer/dataset@{HASH}"),
        format!("peer/dataset@{HASH}/ipfs/{HASH}"),
        format!("peer/dataset@/mem/{HASH}"),
        format!("@/fs/{HASH}"),
        format!("@{HASH}/fs/{HASH}"),
    ];
    for text in &cases {
        let r = parse(text).expect("valid ref");
        assert_eq!(&r.to_string(), text, "render of {text}");
        let again = parse(&r.to_string()).expect("re-parse");
        assert_eq!(again, r);
    }
}

#[test]
fn fields_land_where_expected() {
    let r = parse(&format!("test_peer/movies@{HASH}/ipfs/{HASH}")).expect("parse");
    assert_eq!(r.username, "test_peer");
    assert_eq!(r.name, "movies");
    assert_eq!(r.profile_id, HASH);
    assert_eq!(r.path, format!("/ipfs/{HASH}"));

    let rhs = parse(&format!("@/fs/{HASH}")).expect("path only");
    assert!(rhs.is_right_hand_side_only());
    assert!(rhs.username.is_empty());
}

#[test]
fn upper_case_names_parse_with_a_bad_case_warning() {
    let err = parse("test_peer/a_New_Dataset").expect_err("bad case");
    assert_eq!(
        err,
        ParseError::BadCase(Ref {
            username: "test_peer".into(),
            name: "a_New_Dataset".into(),
            ..Default::default()
        })
    );
    let r = err.into_ref().expect("bad case keeps the ref");
    assert_eq!(r.name, "a_New_Dataset");
    assert_eq!(
        parse("test_peer/a_New_Dataset").expect_err("bad case").to_string(),
        "dataset name may not contain any upper-case letters"
    );
}

#[test]
fn name_validation() {
    assert!(!is_valid_name("_bad"));
    assert!(!is_valid_name("1dataset"));
    assert!(!is_valid_name("dataset!"));
    assert!(!is_valid_name(""));
    assert!(is_valid_name("a_dataset_name"));
    assert!(is_valid_name("Dataset2"));
}

#[test]
fn errors_name_the_offending_position() {
    assert_eq!(parse("peer/1ds").expect_err("digit"), ParseError::Unexpected { pos: 5, ch: '1' });
    assert_eq!(parse("peer/ds!").expect_err("bang"), ParseError::Unexpected { pos: 7, ch: '!' });
    assert_eq!(parse("peer/ds@").expect_err("dangling @"), ParseError::UnexpectedEnd { pos: 8 });
    assert_eq!(parse("").expect_err("empty"), ParseError::Empty);
    assert_eq!(
        parse("peer/1ds").expect_err("digit").to_string(),
        "parsing ref, unexpected character at position 5: '1'"
    );
}

#[test]
fn invalid_base58_is_its_own_error() {
    assert_eq!(parse("peer/ds@/fs/Qm0OIl").expect_err("hash"), ParseError::InvalidBase58Path);
    assert_eq!(parse("peer/ds@Qm0OIl").expect_err("profile"), ParseError::InvalidBase58ProfileId);
    // structural problems are reported as such, not as base58 failures
    assert!(matches!(parse("peer/ds@/FS/abc").expect_err("store tag"), ParseError::Unexpected { .. }));
}

#[test]
fn human_friendly_refuses_version_suffix() {
    let r = parse_human_friendly("peer/dataset").expect("plain");
    assert!(r.is_human_friendly());
    assert_eq!(
        parse_human_friendly(&format!("peer/dataset@/mem/{HASH}")).expect_err("suffix"),
        ParseError::NotHumanFriendly
    );
    assert_eq!(
        parse_human_friendly(&format!("peer/dataset@{HASH}")).expect_err("profile suffix"),
        ParseError::NotHumanFriendly
    );
}
