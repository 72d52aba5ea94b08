use super::*;

#[test]
fn defaults_match_preferences() {
    let s = Settings::default();
    assert!(!s.ignore_hidden_layers);
    assert!(s.ignore_background);
    assert!(!s.write_template);
    assert!(s.write_json);
    assert!(s.trim_whitespace);
    assert!(!s.selection_only);
    assert_eq!(s.scale, 1.0);
    assert_eq!(s.padding, 1);
    assert_eq!(s.images_dir, "./images/");
    assert_eq!(s.json_path, "./");
    assert_eq!(s.format, JsonFormat::Legacy);
}

#[test]
fn parses_camel_case_and_fills_defaults() {
    let s = Settings::from_reader(
        r#"{ "scale": 0.5, "padding": 0, "trimWhitespace": false, "format": "current" }"#
            .as_bytes(),
    )
    .unwrap();
    assert_eq!(s.scale, 0.5);
    assert_eq!(s.padding, 0);
    assert!(!s.trim_whitespace);
    assert_eq!(s.format, JsonFormat::Current);
    assert_eq!(s.images_dir, "./images/");
}

#[test]
fn rejects_unknown_keys() {
    let err = Settings::from_reader(r#"{ "scal": 2 }"#.as_bytes()).unwrap_err();
    assert!(err.to_string().contains("validation error:"));
}

#[test]
fn scale_bounds_are_enforced() {
    for bad in [0.0, -1.0, 4.5, f64::NAN, f64::INFINITY] {
        let s = Settings {
            scale: bad,
            ..Settings::default()
        };
        assert!(s.validate().is_err(), "{bad}");
    }
    for good in [0.01, 1.0, 4.0] {
        let s = Settings {
            scale: good,
            ..Settings::default()
        };
        assert!(s.validate().is_ok(), "{good}");
    }
}

#[test]
fn default_paths_are_relative_to_document() {
    let paths = Settings::default().output_paths(Path::new("/art"), "hero.v2.psd");
    assert_eq!(paths.images_dir, Some(PathBuf::from("/art/images")));
    assert_eq!(paths.json_file, Some(PathBuf::from("/art/hero.json")));
    assert_eq!(paths.error_log, PathBuf::from("/art/errors.txt"));
}

#[test]
fn json_file_name_and_absolute_dirs() {
    let s = Settings {
        images_dir: " /out/img ".to_owned(),
        json_path: "export\\skel.json".to_owned(),
        ..Settings::default()
    };
    let paths = s.output_paths(Path::new("/art"), "hero.psd");
    assert_eq!(paths.images_dir, Some(PathBuf::from("/out/img")));
    assert_eq!(paths.json_file, Some(PathBuf::from("/art/export/skel.json")));
    assert_eq!(paths.error_log, PathBuf::from("/art/export/errors.txt"));
}

#[test]
fn bare_json_file_name_lands_in_document_folder() {
    let s = Settings {
        json_path: "skel.json".to_owned(),
        ..Settings::default()
    };
    let paths = s.output_paths(Path::new("/art"), "hero.psd");
    assert_eq!(paths.json_file, Some(PathBuf::from("/art/skel.json")));
}

#[test]
fn empty_paths_disable_outputs() {
    let s = Settings {
        images_dir: String::new(),
        json_path: "  ".to_owned(),
        ..Settings::default()
    };
    assert!(!s.has_outputs());
    let paths = s.output_paths(Path::new("/art"), "hero.psd");
    assert_eq!(paths.images_dir, None);
    assert_eq!(paths.json_file, None);
    assert_eq!(paths.error_log, PathBuf::from("/art/errors.txt"));
}

#[test]
fn write_json_false_keeps_error_log_location() {
    let s = Settings {
        write_json: false,
        json_path: "out/".to_owned(),
        ..Settings::default()
    };
    let paths = s.output_paths(Path::new("/art"), "hero.psd");
    assert_eq!(paths.json_file, None);
    assert_eq!(paths.error_log, PathBuf::from("/art/out/errors.txt"));
}

#[test]
fn base_name_stops_at_first_dot() {
    assert_eq!(document_base_name("a.b.psd"), "a");
    assert_eq!(document_base_name("plain"), "plain");
}
