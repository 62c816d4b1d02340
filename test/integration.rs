// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{AllTools, FakeApt, FakeRemote, FixedHost, NoTools, RootFixture, StripArmor};

use aptstrap::{
    bootstrap::{BootstrapError, Bootstrapper, Stage},
    config::{ProvisionPlan, RepositorySpec},
    host::{DebianVersionFile, HostDetector, HostIdentity, LsbReleaseFile, PresetIdentity},
    keyring::{KeyPlacement, KeyringLayout},
    path::{FSTAB, LSB_RELEASE, SOURCES_LIST},
    provision::provision,
    repository::{definition_path, RepositoryError},
    transfer::TransferOutcome,
};

use anyhow::Result;
use indoc::indoc;
use pretty_assertions::assert_eq;
use std::fs::{read, read_to_string};

const ARMORED: &str = indoc! {"
    -----BEGIN PGP PUBLIC KEY BLOCK-----
    mQINBFit2ioBEADhWpZ8/wvZ6hUTiXOwQHXMAlaFHcPH9hAtr4F1y2+OYdbtMuth
    -----END PGP PUBLIC KEY BLOCK-----
"};

const DEFINITION: &str = "deb [signed-by=/etc/apt/keyrings/editor_archive-keyring.gpg] https://blah.org/editor/debian/ bookworm main\n";

fn editor() -> RepositorySpec {
    RepositorySpec {
        name: "editor".into(),
        definition_url: "https://blah.org/editor/config_file.list?os={os}&dist={dist}".into(),
        key_url: "https://blah.org/editor/gpgkey".into(),
        packages: vec!["editor".into()],
    }
}

fn tooling() -> RepositorySpec {
    RepositorySpec {
        name: "tooling".into(),
        definition_url: "https://blah.org/tooling/config_file.list?os={os}&dist={dist}".into(),
        key_url: "https://blah.org/tooling/gpgkey".into(),
        packages: vec![],
    }
}

fn remote_for(host: &str) -> FakeRemote {
    FakeRemote::default()
        .route(
            format!("https://blah.org/editor/config_file.list?{host}"),
            TransferOutcome::Success(DEFINITION.as_bytes().to_vec()),
        )
        .route(
            "https://blah.org/editor/gpgkey",
            TransferOutcome::Success(ARMORED.as_bytes().to_vec()),
        )
        .route(
            format!("https://blah.org/tooling/config_file.list?{host}"),
            TransferOutcome::Success(b"deb https://blah.org/tooling bookworm main\n".to_vec()),
        )
        .route(
            "https://blah.org/tooling/gpgkey",
            TransferOutcome::Success(ARMORED.as_bytes().to_vec()),
        )
}

fn bookworm() -> Vec<Box<dyn HostDetector>> {
    vec![Box::new(FixedHost(Some(HostIdentity::new("Debian", "bookworm"))))]
}

#[test]
fn bootstrap_repositories_on_modern_apt() -> Result<()> {
    let fixture = RootFixture::new()?;
    let apt = FakeApt::new("apt 2.6.1 (amd64)");
    let remote = remote_for("os=debian&dist=bookworm");
    let bootstrapper = Bootstrapper::new(
        fixture.root(),
        PresetIdentity::default(),
        &AllTools,
        &apt,
        &remote,
        &StripArmor,
    )
    .with_detectors(bookworm());

    let report = bootstrapper.run(&[editor(), tooling()])?;

    assert_eq!(report.context.host, HostIdentity::new("debian", "bookworm"));
    assert_eq!(report.context.apt_version.code().0, 260);
    assert_eq!(report.repositories.len(), 2);

    let layout = KeyringLayout::new(&fixture.root(), "editor");
    assert_eq!(report.repositories[0].key, KeyPlacement::Keyring(layout.keyring_path.clone()));
    assert_eq!(read_to_string(definition_path(&fixture.root(), "editor"))?, DEFINITION);
    assert_eq!(
        read(&layout.keyring_path)?,
        b"mQINBFit2ioBEADhWpZ8/wvZ6hUTiXOwQHXMAlaFHcPH9hAtr4F1y2+OYdbtMuth".to_vec()
    );
    assert!(!layout.legacy_path.exists());

    assert_eq!(
        apt.calls.borrow().as_slice(),
        [
            "update",
            "install debian-archive-keyring",
            "install apt-transport-https",
            "update",
        ]
    );

    Ok(())
}

#[test]
fn bootstrap_on_legacy_apt_uses_trusted_keys() -> Result<()> {
    let fixture = RootFixture::new()?;
    let apt = FakeApt::new("apt 1.0.1ubuntu2 for amd64 compiled on Jan 20 2017 18:01:28");
    let remote = remote_for("os=ubuntu&dist=trusty");
    let bootstrapper = Bootstrapper::new(
        fixture.root(),
        PresetIdentity::new(Some("ubuntu".into()), Some("trusty".into())),
        &AllTools,
        &apt,
        &remote,
        &StripArmor,
    );

    let report = bootstrapper.run(&[editor()])?;

    let layout = KeyringLayout::new(&fixture.root(), "editor");
    assert_eq!(report.repositories[0].key, KeyPlacement::Legacy(layout.legacy_path.clone()));
    assert!(layout.legacy_path.exists());
    assert!(!layout.keyring_dir.exists());
    assert!(!apt.calls.borrow().iter().any(|call| call.contains("debian-archive-keyring")));

    Ok(())
}

#[test]
fn unsupported_host_aborts_before_any_download() -> Result<()> {
    let fixture = RootFixture::new()?;
    fixture.write(LSB_RELEASE, "this is not a release file\n")?;
    let apt = FakeApt::new("apt 2.6.1 (amd64)");
    let remote = remote_for("os=debian&dist=bookworm");
    let detectors: Vec<Box<dyn HostDetector>> = vec![
        Box::new(LsbReleaseFile::new(fixture.root())),
        Box::new(DebianVersionFile::new(fixture.root())),
    ];
    let bootstrapper = Bootstrapper::new(
        fixture.root(),
        PresetIdentity::default(),
        &AllTools,
        &apt,
        &remote,
        &StripArmor,
    )
    .with_detectors(detectors);

    let error = bootstrapper.run(&[editor()]).unwrap_err();

    assert_eq!(error.stage(), Stage::DetectHost);
    assert!(error.to_string().contains("os= and dist="));
    assert!(remote.requests.borrow().is_empty());
    assert!(apt.calls.borrow().is_empty());

    Ok(())
}

#[test]
fn missing_prerequisite_is_fatal() -> Result<()> {
    let fixture = RootFixture::new()?;
    let apt = FakeApt::new("apt 2.6.1 (amd64)");
    let remote = remote_for("os=debian&dist=bookworm");
    let bootstrapper = Bootstrapper::new(
        fixture.root(),
        PresetIdentity::default(),
        &NoTools,
        &apt,
        &remote,
        &StripArmor,
    )
    .with_detectors(bookworm());

    let error = bootstrapper.run(&[editor()]).unwrap_err();

    assert!(matches!(error, BootstrapError::Prerequisite(_)));
    assert_eq!(apt.calls.borrow().as_slice(), ["install curl"]);
    assert!(remote.requests.borrow().is_empty());

    Ok(())
}

#[test]
fn rejected_definition_leaves_no_declaration() -> Result<()> {
    let fixture = RootFixture::new()?;
    let apt = FakeApt::new("apt 2.6.1 (amd64)");
    let remote = remote_for("os=debian&dist=bookworm");
    let bootstrapper = Bootstrapper::new(
        fixture.root(),
        PresetIdentity::new(Some("plan9".into()), Some("4e".into())),
        &AllTools,
        &apt,
        &remote,
        &StripArmor,
    );

    let error = bootstrapper.run(&[editor()]).unwrap_err();

    assert!(matches!(
        error,
        BootstrapError::Repository(RepositoryError::UnsupportedHostOrRepo { .. })
    ));
    assert!(!definition_path(&fixture.root(), "editor").exists());
    assert_eq!(
        remote.requests.borrow().as_slice(),
        ["https://blah.org/editor/config_file.list?os=plan9&dist=4e"]
    );

    Ok(())
}

#[test]
fn failed_rerun_keeps_previous_key() -> Result<()> {
    let fixture = RootFixture::new()?;
    let apt = FakeApt::new("apt 2.6.1 (amd64)");
    let first = remote_for("os=debian&dist=bookworm");
    Bootstrapper::new(
        fixture.root(),
        PresetIdentity::default(),
        &AllTools,
        &apt,
        &first,
        &StripArmor,
    )
    .with_detectors(bookworm())
    .run(&[editor()])?;

    let second = FakeRemote::default().route(
        "https://blah.org/editor/config_file.list?os=debian&dist=bookworm",
        TransferOutcome::TlsFailure,
    );
    let error = Bootstrapper::new(
        fixture.root(),
        PresetIdentity::default(),
        &AllTools,
        &apt,
        &second,
        &StripArmor,
    )
    .with_detectors(bookworm())
    .run(&[editor()])
    .unwrap_err();

    assert_eq!(error.stage(), Stage::FetchRepoDefinition);
    assert!(error.to_string().contains("CA root certificates"));
    assert!(!definition_path(&fixture.root(), "editor").exists());
    assert!(KeyringLayout::new(&fixture.root(), "editor").keyring_path.exists());

    Ok(())
}

#[test]
fn failing_index_refresh_is_not_fatal() -> Result<()> {
    let fixture = RootFixture::new()?;
    let mut apt = FakeApt::new("apt 2.6.1 (amd64)");
    apt.failing_update = true;
    let remote = remote_for("os=debian&dist=bookworm");
    let bootstrapper = Bootstrapper::new(
        fixture.root(),
        PresetIdentity::default(),
        &AllTools,
        &apt,
        &remote,
        &StripArmor,
    )
    .with_detectors(bookworm());

    let report = bootstrapper.run(&[editor()])?;
    assert_eq!(report.repositories.len(), 1);

    Ok(())
}

#[test]
fn provision_whole_plan() -> Result<()> {
    let fixture = RootFixture::new()?;
    fixture.write(FSTAB, "UUID=1234 / ext4 defaults 0 1\n")?;
    let plan: ProvisionPlan = indoc! {r#"
        [sources]
        mirror = "http://deb.debian.org/debian"
        channel = "unstable"
        components = ["main", "contrib"]

        [packages]
        install = ["vim", "virt-manager"]

        [[repository]]
        name = "editor"
        definition_url = "https://blah.org/editor/config_file.list?os={os}&dist={dist}"
        key_url = "https://blah.org/editor/gpgkey"
        packages = ["editor"]

        [[dotfile]]
        path = "/home/blah/.bash_aliases"
        contents = "alias ll='ls -l'\n"

        [[mount]]
        source = "//nas/share"
        target = "/mnt/share"
        fstype = "cifs"
        options = "uid=1000"
    "#}
    .parse()?;

    let apt = FakeApt::new("apt 2.6.1 (amd64)");
    let remote = remote_for("os=debian&dist=bookworm");
    let bootstrapper = Bootstrapper::new(
        fixture.root(),
        PresetIdentity::default(),
        &AllTools,
        &apt,
        &remote,
        &StripArmor,
    )
    .with_detectors(bookworm());

    let report = provision(&fixture.root(), &plan, &apt, &bootstrapper)?;

    assert!(report.is_some());
    assert_eq!(
        read_to_string(fixture.resolve(SOURCES_LIST))?,
        "deb http://deb.debian.org/debian unstable main contrib\n"
    );
    assert_eq!(
        read_to_string(fixture.resolve("/home/blah/.bash_aliases"))?,
        "alias ll='ls -l'\n"
    );
    assert_eq!(
        read_to_string(fixture.resolve(FSTAB))?,
        "UUID=1234 / ext4 defaults 0 1\n//nas/share /mnt/share cifs uid=1000 0 0\n"
    );
    assert_eq!(
        apt.calls.borrow().as_slice(),
        [
            "update",
            "install vim virt-manager",
            "update",
            "install debian-archive-keyring",
            "install apt-transport-https",
            "update",
            "update",
            "install editor",
        ]
    );

    Ok(())
}
