//! Integration tests for autopkg-runner

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;

    fn runner() -> Command {
        let mut cmd = cargo_bin_cmd!("autopkg-runner");
        for var in [
            "RECIPE",
            "METADATA_CACHE_PATH",
            "RECIPES_DIR_NAME",
            "SLACK_WEBHOOK_TOKEN",
            "AUTOPKG_RUNNER_CONFIG",
        ] {
            cmd.env_remove(var);
        }
        cmd
    }

    #[test]
    fn help_displays() {
        runner()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("run AutoPkg recipes one at a time"));
    }

    #[test]
    fn version_displays() {
        runner()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("autopkg-runner"));
    }

    #[test]
    fn no_recipes_fails() {
        runner()
            .assert()
            .failure()
            .stderr(predicate::str::contains("RECIPE not provided"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn unsupported_list_extension_fails() {
        let temp = tempfile::TempDir::new().unwrap();
        let list = temp.path().join("recipes.txt");
        std::fs::write(&list, "Foo.pkg.recipe").unwrap();

        runner()
            .arg("--list")
            .arg(&list)
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid recipe list extension"));
    }

    #[test]
    fn invalid_config_fails() {
        let temp = tempfile::TempDir::new().unwrap();
        let config = temp.path().join("config.toml");
        std::fs::write(&config, "[paths\nautopkg = 1").unwrap();

        runner()
            .arg("--config")
            .arg(&config)
            .env("RECIPE", "Foo")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));
    }
}

#[cfg(unix)]
mod run_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    const REPORT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
  <key>failures</key>
  <array/>
  <key>summary_results</key>
  <dict>
    <key>url_downloader_summary_result</key>
    <dict>
      <key>data_rows</key>
      <array>
        <dict>
          <key>download_path</key>
          <string>__DOWNLOAD__</string>
        </dict>
      </array>
    </dict>
    <key>pkg_creator_summary_result</key>
    <dict>
      <key>data_rows</key>
      <array>
        <dict>
          <key>pkg_path</key>
          <string>/tmp/Foo-4.5.pkg</string>
          <key>version</key>
          <string>4.5</string>
        </dict>
      </array>
    </dict>
  </dict>
</dict>
</plist>
"#;

    struct Workspace {
        temp: TempDir,
        config: PathBuf,
    }

    impl Workspace {
        /// Fake autopkg that downloads one file and reports one build
        fn new(exit_code: i32) -> Self {
            let temp = TempDir::new().unwrap();
            let root = temp.path();

            let recipes = root.join("recipes/vendor");
            std::fs::create_dir_all(&recipes).unwrap();
            std::fs::write(recipes.join("Foo.download.recipe"), b"").unwrap();

            let downloads = root.join("Cache/com.x.Foo/downloads");
            std::fs::create_dir_all(&downloads).unwrap();
            let download = downloads.join("Foo.dmg");

            let report = REPORT.replace("__DOWNLOAD__", &download.to_string_lossy());
            let script = format!(
                "#!/bin/sh\nprintf 'payload' > '{}'\ncat > \"$5\" <<'PLIST'\n{}PLIST\nexit {}\n",
                download.display(),
                report,
                exit_code
            );
            let autopkg = root.join("autopkg");
            std::fs::write(&autopkg, script).unwrap();
            std::fs::set_permissions(&autopkg, std::fs::Permissions::from_mode(0o755)).unwrap();

            let config = root.join("config.toml");
            std::fs::write(
                &config,
                format!(
                    "[paths]\nmetadata_cache = \"{}\"\nreport_plist = \"{}\"\nautopkg = \"{}\"\nrecipe_search_dirs = [\"{}\"]\n",
                    root.join("meta.json").display(),
                    root.join("report.plist").display(),
                    autopkg.display(),
                    root.join("recipes").display(),
                ),
            )
            .unwrap();

            Self { temp, config }
        }

        fn path(&self) -> &Path {
            self.temp.path()
        }

        fn runner(&self) -> Command {
            let mut cmd = cargo_bin_cmd!("autopkg-runner");
            cmd.env_remove("RECIPE")
                .env_remove("METADATA_CACHE_PATH")
                .env_remove("RECIPES_DIR_NAME")
                .env_remove("SLACK_WEBHOOK_TOKEN")
                .arg("--config")
                .arg(&self.config);
            cmd
        }
    }

    #[test]
    fn successful_run_records_cache() {
        let ws = Workspace::new(0);

        ws.runner()
            .args(["--cache", "--debug", "--recipe", "Foo.download,Missing"])
            .assert()
            .success()
            .stdout(predicate::str::contains("SUCCESS: Built"))
            .stdout(predicate::str::contains(
                "Finished 2 recipe(s): 1 succeeded, 0 failed, 1 not found",
            ));

        let cache = std::fs::read_to_string(ws.path().join("meta.json")).unwrap();
        let cache: serde_json::Value = serde_json::from_str(&cache).unwrap();
        let record = &cache["Foo.download.recipe"]["download_metadata"][0];
        assert_eq!(record["dl_size_in_bytes"], "7");
        assert!(record["pathname"].as_str().unwrap().ends_with("downloads/Foo.dmg"));
    }

    #[test]
    fn failed_tool_does_not_record() {
        let ws = Workspace::new(1);

        ws.runner()
            .args(["--cache", "--debug", "--recipe", "Foo.download"])
            .assert()
            .success()
            .stdout(predicate::str::contains("1 failed"));

        assert!(!ws.path().join("meta.json").exists());
    }

    #[test]
    fn missing_webhook_skips_notification() {
        let ws = Workspace::new(0);

        ws.runner()
            .args(["--recipe", "Foo.download"])
            .assert()
            .success()
            .stdout(predicate::str::contains("webhook is missing"));
    }
}
