//! Startup checks
//!
//! Preflight checks run before a batch starts:
//! - The configured engine can be spawned and reports a version
//! - Engine settings are usable

use crate::config::Config;
use std::process::Command;
use thiserror::Error;

/// Error types for startup checks
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Engine not available: {0}")]
    EngineUnavailable(String),

    #[error("Could not determine engine version: {0}")]
    EngineVersion(String),

    #[error("Invalid engine configuration: {0}")]
    InvalidConfig(String),
}

/// Extract the version token from an engine's `-version` banner
///
/// Handles the usual ffmpeg formats:
/// - Standard: "ffmpeg version 6.1.1 Copyright ..."
/// - N-prefixed: "ffmpeg version n7.0-12-gabcdef ..."
/// - Git builds: "ffmpeg version N-113000-g1234567 ..."
///
/// The leading `n` of release tags is stripped; anything else is returned as
/// printed.
pub fn parse_engine_version(version_output: &str) -> Option<String> {
    let token = version_output.lines().find_map(|line| {
        let mut words = line.split_whitespace().skip(1);
        while let Some(word) = words.next() {
            if word.eq_ignore_ascii_case("version") {
                return words.next();
            }
        }
        None
    })?;

    let token = match token.strip_prefix('n') {
        Some(rest) if rest.starts_with(|c: char| c.is_ascii_digit()) => rest,
        _ => token,
    };
    Some(token.to_string())
}

/// Check that `program` runs and reports a version via `<program> -version`
///
/// Returns the parsed version token.
pub fn check_engine_available(program: &str) -> Result<String, StartupError> {
    let output = Command::new(program)
        .arg("-version")
        .output()
        .map_err(|e| {
            StartupError::EngineUnavailable(format!(
                "{} -version failed; is it installed and in PATH? Error: {}",
                program, e
            ))
        })?;

    if !output.status.success() {
        return Err(StartupError::EngineUnavailable(format!(
            "{} -version exited with {}",
            program, output.status
        )));
    }

    let version_output = String::from_utf8_lossy(&output.stdout);
    parse_engine_version(&version_output).ok_or_else(|| {
        StartupError::EngineVersion(format!(
            "unexpected banner: {}",
            version_output.lines().next().unwrap_or("(empty)")
        ))
    })
}

/// Reject engine settings that would make every task fail
pub fn check_engine_config(cfg: &Config) -> Result<(), StartupError> {
    if cfg.engine.program.trim().is_empty() {
        return Err(StartupError::InvalidConfig(
            "engine.program is empty".to_string(),
        ));
    }
    let ext = cfg.engine.output_extension.trim_start_matches('.');
    if ext.is_empty() || ext.contains(['/', '\\']) {
        return Err(StartupError::InvalidConfig(format!(
            "engine.output_extension '{}' is not a file extension",
            cfg.engine.output_extension
        )));
    }
    Ok(())
}

/// Run all startup checks in order, returning the engine version
///
/// 1. Engine configuration
/// 2. Engine availability
pub fn run_startup_checks(cfg: &Config) -> Result<String, StartupError> {
    check_engine_config(cfg)?;
    check_engine_available(&cfg.engine.program)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_version_parsing_standard(
            major in 1u32..20,
            minor in 0u32..10,
            patch in 0u32..10,
        ) {
            let version_output = format!(
                "ffmpeg version {}.{}.{} Copyright (c) 2000-2024 the FFmpeg developers",
                major, minor, patch
            );

            prop_assert_eq!(
                parse_engine_version(&version_output),
                Some(format!("{}.{}.{}", major, minor, patch))
            );
        }

        #[test]
        fn prop_version_parsing_n_prefixed(
            major in 1u32..20,
            minor in 0u32..10,
            git_hash in "[a-f0-9]{7}",
        ) {
            let version_output = format!(
                "ffmpeg version n{}.{}-123-g{} Copyright (c) 2000-2024\nbuilt with gcc 12.2.0",
                major, minor, git_hash
            );

            let parsed = parse_engine_version(&version_output).unwrap();
            let expected_prefix = format!("{}.{}-", major, minor);
            prop_assert!(parsed.starts_with(&expected_prefix));
        }
    }

    #[test]
    fn test_git_build_version_is_kept() {
        assert_eq!(
            parse_engine_version("ffmpeg version N-113000-g1234567 Copyright"),
            Some("N-113000-g1234567".to_string())
        );
    }

    #[test]
    fn test_non_ascii_banner_does_not_split_chars() {
        // Lowercasing 'İ' changes its byte length
        assert_eq!(
            parse_engine_version("İİİİ ffmpeg Version 6.1 built"),
            Some("6.1".to_string())
        );
        assert_eq!(parse_engine_version("İİİİİİ version"), None);
        assert_eq!(
            parse_engine_version("ÄÖÜ\nffmpeg version n7.0.2 Copyright"),
            Some("7.0.2".to_string())
        );
    }

    #[test]
    fn test_unparsable_banner() {
        assert_eq!(parse_engine_version(""), None);
        assert_eq!(parse_engine_version("-version\n"), None);
    }

    #[test]
    fn test_missing_engine_is_unavailable() {
        let err = check_engine_available("mediabatch-no-such-engine").unwrap_err();
        assert!(matches!(err, StartupError::EngineUnavailable(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_engine_without_banner_is_rejected() {
        // `echo -version` succeeds but prints no version banner
        let err = check_engine_available("echo").unwrap_err();
        assert!(matches!(err, StartupError::EngineVersion(_)));
    }

    #[test]
    fn test_engine_config_validation() {
        let mut cfg = Config::default();
        assert!(check_engine_config(&cfg).is_ok());

        cfg.engine.output_extension = ".mkv".to_string();
        assert!(check_engine_config(&cfg).is_ok());

        cfg.engine.output_extension = "out/mp4".to_string();
        assert!(check_engine_config(&cfg).is_err());

        cfg.engine.output_extension = "mp4".to_string();
        cfg.engine.program = "  ".to_string();
        assert!(matches!(
            check_engine_config(&cfg),
            Err(StartupError::InvalidConfig(_))
        ));
    }
}
