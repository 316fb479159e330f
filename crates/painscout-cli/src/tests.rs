use super::*;

#[test]
fn parses_find_with_defaults() {
    let cli = Cli::try_parse_from(["painscout", "find", "saas pricing"]).expect("valid cli args");

    let Commands::Find(args) = cli.command else {
        panic!("expected find command");
    };
    assert_eq!(args.topic, "saas pricing");
    assert_eq!(args.min_replies, 2);
    assert!(!args.deep);
    assert!(!args.json);

    let input = args.to_input();
    assert!(input.audience.is_none());
    assert!(input.language.is_none());
}

#[test]
fn parses_find_with_options() {
    let cli = Cli::try_parse_from([
        "painscout",
        "find",
        "invoicing",
        "--language",
        "German",
        "--min-replies",
        "0",
        "--audience",
        "indie_hackers",
        "--deep",
        "--json",
    ])
    .expect("valid cli args");

    let Commands::Find(args) = cli.command else {
        panic!("expected find command");
    };
    let input = args.to_input();
    assert_eq!(input.language.as_deref(), Some("German"));
    assert_eq!(input.min_replies, 0);
    assert_eq!(input.audience.as_deref(), Some("indie_hackers"));
    assert!(input.deep);
    assert!(args.json);
}

#[test]
fn custom_audience_flags_build_custom_input() {
    let cli = Cli::try_parse_from([
        "painscout",
        "find",
        "invoicing",
        "--custom-keyword",
        "freelancer",
        "--custom-keyword",
        "contractor",
        "--custom-hashtag",
        "freelance",
    ])
    .expect("valid cli args");

    let Commands::Find(args) = cli.command else {
        panic!("expected find command");
    };
    let input = args.to_input();
    assert_eq!(input.audience.as_deref(), Some("custom"));
    let custom = input.custom_audience.expect("custom audience");
    assert_eq!(custom.identifying_keywords, vec!["freelancer", "contractor"]);
    assert_eq!(custom.hashtags, vec!["freelance"]);
}

#[test]
fn preset_and_custom_flags_conflict() {
    let result = Cli::try_parse_from([
        "painscout",
        "find",
        "invoicing",
        "--audience",
        "developers",
        "--custom-keyword",
        "freelancer",
    ]);
    assert!(result.is_err());
}

#[test]
fn parses_audiences_command() {
    let cli = Cli::try_parse_from(["painscout", "audiences"]).expect("valid cli args");
    assert!(matches!(cli.command, Commands::Audiences));
}

#[test]
fn find_requires_topic() {
    assert!(Cli::try_parse_from(["painscout", "find"]).is_err());
}

#[test]
fn builtin_registry_without_file() {
    let registry = load_registry(None).expect("builtin registry");
    assert!(registry.get("developers").is_some());
}
