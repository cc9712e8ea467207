use super::*;

#[test]
fn parses_accounts_command() {
    let cli = Cli::try_parse_from(["adbatch", "accounts"]).expect("expected valid cli args");
    assert!(matches!(cli.command, Commands::Accounts));
}

#[test]
fn parses_campaigns_command() {
    let cli =
        Cli::try_parse_from(["adbatch", "campaigns", "act_42"]).expect("expected valid cli args");
    assert!(matches!(
        cli.command,
        Commands::Campaigns { ref account_id } if account_id == "act_42"
    ));
}

#[test]
fn create_accepts_repeated_and_comma_separated_targets() {
    let cli = Cli::try_parse_from([
        "adbatch",
        "create",
        "--account",
        "42",
        "--target",
        "2385,2386",
        "--target",
        "2387",
        "--prefix",
        "Spring",
        "a.mp4",
        "b.mp4",
    ])
    .expect("expected valid cli args");

    let Commands::Create {
        account,
        targets,
        prefix,
        status,
        files,
        name,
        thumbnail,
    } = cli.command
    else {
        panic!("expected create command");
    };
    assert_eq!(account, "42");
    assert_eq!(targets, vec!["2385", "2386", "2387"]);
    assert_eq!(prefix, "Spring");
    assert_eq!(status, StatusArg::Paused);
    assert_eq!(files, vec![PathBuf::from("a.mp4"), PathBuf::from("b.mp4")]);
    assert!(name.is_none());
    assert!(thumbnail.is_none());
}

#[test]
fn create_parses_status_and_thumbnail() {
    let cli = Cli::try_parse_from([
        "adbatch",
        "create",
        "--account",
        "42",
        "--target",
        "2385",
        "--status",
        "active",
        "--thumbnail",
        "thumb.jpg",
        "--name",
        "Hero",
        "clip.mp4",
    ])
    .expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Commands::Create {
            status: StatusArg::Active,
            thumbnail: Some(_),
            name: Some(_),
            ..
        }
    ));
    assert_eq!(AdStatus::from(StatusArg::Active), AdStatus::Active);
}

#[test]
fn create_requires_files_and_targets() {
    assert!(Cli::try_parse_from(["adbatch", "create", "--account", "42", "--target", "1"]).is_err());
    assert!(Cli::try_parse_from(["adbatch", "create", "--account", "42", "clip.mp4"]).is_err());
}
