use super::*;

#[test]
fn parses_keywords_and_values() {
    let tags = TagList::parse("Arm [bone] [slot:Hand ] [scale:0.5]");
    let kinds: Vec<_> = tags.iter().map(|t| t.kind).collect();
    assert_eq!(
        kinds,
        vec![Some(TagKind::Bone), Some(TagKind::Slot), Some(TagKind::Scale)]
    );
    assert_eq!(tags.value(TagKind::Bone), None);
    assert_eq!(tags.value(TagKind::Slot), Some("Hand"));
    assert_eq!(tags.value(TagKind::Scale), Some("0.5"));
}

#[test]
fn unknown_and_malformed_tokens_have_no_kind() {
    for raw in ["Head [wat]", "x [ignore:yes]", "x [scale]", "x [path:]", "x [Bone]"] {
        let tags = TagList::parse(raw);
        let tag = tags.iter().next().unwrap();
        assert_eq!(tag.kind, None, "{raw}");
    }
}

#[test]
fn empty_brackets_are_not_tags() {
    assert!(TagList::parse("a [] b").is_empty());
    assert_eq!(strip_tags("a [] b"), "a [] b");
}

#[test]
fn unclosed_bracket_is_plain_text() {
    assert!(TagList::parse("Head [bone").is_empty());
    assert_eq!(strip_tags("Head [bone"), "Head [bone");
}

#[test]
fn strip_tags_removes_every_token() {
    assert_eq!(strip_tags("  Left [bone] Arm [slot:x]  "), "Left  Arm");
    assert_eq!(strip_tags("[ignore]"), "");
}

#[test]
fn role_legality_matches_grammar() {
    for kind in [
        TagKind::Bone,
        TagKind::Slot,
        TagKind::Skin,
        TagKind::Folder,
        TagKind::Ignore,
    ] {
        assert!(kind.allowed_on(NodeRole::Group));
        assert!(kind.allowed_on(NodeRole::Layer));
    }
    for kind in [TagKind::Merge, TagKind::Name] {
        assert!(kind.allowed_on(NodeRole::Group));
        assert!(!kind.allowed_on(NodeRole::Layer));
    }
    for kind in [
        TagKind::Overlay,
        TagKind::Trim,
        TagKind::Mesh,
        TagKind::Path,
        TagKind::Scale,
    ] {
        assert!(!kind.allowed_on(NodeRole::Group));
        assert!(kind.allowed_on(NodeRole::Layer));
    }
}

#[test]
fn check_reports_role_restriction() {
    let err = TagList::parse("Body [merge]")
        .check(NodeRole::Layer)
        .unwrap_err();
    assert_eq!(err.tag, "merge");
    assert_eq!(err.valid_for, Some(NodeRole::Group));
    let msg = err.describe("Body [merge]");
    assert!(msg.starts_with("Invalid layer name:"));
    assert!(msg.contains("The [merge] tag is only valid for groups, not for layers."));
}

#[test]
fn check_reports_unknown_tag() {
    let err = TagList::parse("Group [bone] [bogus]")
        .check(NodeRole::Group)
        .unwrap_err();
    assert_eq!(err.valid_for, None);
    assert!(
        err.describe("Group [bone] [bogus]")
            .contains("The [bogus] tag is not a valid tag.")
    );
}

#[test]
fn check_is_order_independent() {
    let a = TagList::parse("x [bone] [trim] [mesh]");
    let b = TagList::parse("x [mesh] [bone] [trim]");
    assert!(a.check(NodeRole::Layer).is_ok());
    assert!(b.check(NodeRole::Layer).is_ok());
    assert_eq!(
        a.check(NodeRole::Group).is_err(),
        b.check(NodeRole::Group).is_err()
    );
    assert_eq!(a.check(NodeRole::Layer), a.check(NodeRole::Layer));
}

#[test]
fn first_of_picks_earliest_in_name() {
    let tags = TagList::parse("x [skin:alt] [folder:f]");
    let first = tags.first_of(&[TagKind::Folder, TagKind::Skin]).unwrap();
    assert_eq!(first.kind, Some(TagKind::Skin));
}

#[test]
fn inheritance_partition() {
    let inherited: Vec<_> = TagKind::ALL
        .into_iter()
        .filter(|k| k.is_inherited())
        .collect();
    assert_eq!(
        inherited,
        vec![
            TagKind::Bone,
            TagKind::Slot,
            TagKind::Skin,
            TagKind::Folder,
            TagKind::Name
        ]
    );
}
