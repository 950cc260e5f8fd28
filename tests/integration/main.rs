//! Integration tests for linkcache
//!
//! Each test builds a scratch workspace with a fake linker (`fakeld`) and a
//! fake API digest oracle (`linkhash`) on PATH, then drives the real binary.

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;

    fn linkcache() -> Command {
        cargo_bin_cmd!("linkcache")
    }

    #[test]
    fn help_displays() {
        linkcache()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("Link-step cache wrapper"));
    }

    #[test]
    fn version_displays() {
        linkcache()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("linkcache"));
    }

    #[test]
    fn missing_command_fails() {
        linkcache().assert().failure();
    }
}

mod cache_tests {
    use assert_cmd::{assert::Assert, cargo::cargo_bin_cmd, Command};
    use filetime::FileTime;
    use predicates::prelude::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// Concatenates every non-flag argument into the `-o` target
    const FAKE_LINKER: &str = r#"#!/bin/sh
out=""
ins=""
while [ $# -gt 0 ]; do
  case "$1" in
    -o) out="$2"; shift 2 ;;
    -*) shift ;;
    *) ins="$ins $1"; shift ;;
  esac
done
cat $ins > "$out"
"#;

    /// Reports `<artifact>.api` if present, otherwise a constant surface
    const FAKE_ORACLE: &str = r#"#!/bin/sh
if [ -f "$1.api" ]; then
  cat "$1.api"
else
  echo api-stable
fi
"#;

    struct Workspace {
        work: TempDir,
        bin: TempDir,
    }

    impl Workspace {
        fn new() -> Self {
            let ws = Self {
                work: TempDir::new().unwrap(),
                bin: TempDir::new().unwrap(),
            };
            ws.install("fakeld", FAKE_LINKER);
            ws.install("linkhash", FAKE_ORACLE);
            ws.write("foo.o", "foo-v1\n");
            ws.write("bar.o", "bar-v1\n");
            ws.write("main.o", "main-v1\n");
            ws
        }

        fn install(&self, name: &str, script: &str) {
            let path = self.bin.path().join(name);
            fs::write(&path, script).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        }

        fn path(&self, name: &str) -> PathBuf {
            self.work.path().join(name)
        }

        fn write(&self, name: &str, content: &str) {
            fs::write(self.path(name), content).unwrap();
        }

        fn read(&self, name: &str) -> String {
            fs::read_to_string(self.path(name)).unwrap()
        }

        fn pin(&self, name: &str, secs: i64) {
            filetime::set_file_mtime(self.path(name), FileTime::from_unix_time(secs, 0)).unwrap();
        }

        fn mtime(&self, name: &str) -> FileTime {
            FileTime::from_last_modification_time(&fs::metadata(self.path(name)).unwrap())
        }

        fn search_path(&self) -> std::ffi::OsString {
            let system = std::env::var_os("PATH").unwrap_or_default();
            let mut dirs = vec![self.bin.path().to_path_buf()];
            dirs.extend(std::env::split_paths(&system));
            std::env::join_paths(dirs).unwrap()
        }

        fn cmd(&self) -> Command {
            let mut cmd = cargo_bin_cmd!("linkcache");
            cmd.current_dir(self.work.path())
                .env("PATH", self.search_path())
                .env("LINKCACHE_CONFIG", self.bin.path().join("absent.toml"))
                .env_remove("RUST_LOG")
                .env_remove("LD_LIBRARY_PATH")
                .args(["--log-level", "debug", "--"]);
            cmd
        }

        fn link(&self, args: &[&str]) -> Assert {
            self.cmd().arg("fakeld").args(args).assert()
        }

        fn link_libfoo(&self) -> Assert {
            self.link(&["-shared", "foo.o", "-o", "libfoo.so"])
        }

        fn link_libbar(&self) -> Assert {
            self.link(&["-shared", "bar.o", "libfoo.so", "-o", "libbar.so"])
        }

        fn link_prog(&self) -> Assert {
            self.link(&["main.o", "libbar.so", "libfoo.so", "-o", "prog"])
        }

        fn build_all(&self) {
            self.link_libfoo().success();
            self.link_libbar().success();
            self.link_prog().success();
        }

        /// Give every artifact a distinct, ordered mtime as if built long ago
        fn settle(&self) {
            for name in ["foo.o", "bar.o", "main.o"] {
                self.pin(name, 1_000);
            }
            self.pin("libfoo.so", 2_000);
            self.pin("libfoo.so.apid", 2_000);
            self.pin("libbar.so", 3_000);
            self.pin("libbar.so.apid", 3_000);
            self.pin("prog", 4_000);
        }
    }

    #[test]
    fn fresh_build_misses_everywhere() {
        let ws = Workspace::new();

        let steps: [fn(&Workspace) -> Assert; 3] = [
            Workspace::link_libfoo,
            Workspace::link_libbar,
            Workspace::link_prog,
        ];
        for step in steps {
            step(&ws)
                .success()
                .stderr(predicate::str::contains("Output of command does not yet exist"))
                .stderr(predicate::str::contains("Cache miss, executing subcommand"));
        }

        assert_eq!(ws.read("libfoo.so"), "foo-v1\n");
        assert_eq!(ws.read("prog"), "main-v1\nbar-v1\nfoo-v1\nfoo-v1\n");
        assert!(ws.path("libfoo.so.cacheinfo").exists());
        assert_eq!(ws.read("libfoo.so.apid"), "api-stable\n");
        assert_eq!(ws.read("libbar.so.apid"), "api-stable\n");
        assert!(ws.path("prog.cacheinfo").exists());
        assert!(!ws.path("prog.apid").exists());
    }

    #[test]
    fn rebuild_without_changes_hits() {
        let ws = Workspace::new();
        ws.build_all();
        ws.settle();
        // Content changes that are invisible to mtime must not be picked up
        ws.write("main.o", "main-v2\n");
        ws.pin("main.o", 1_000);

        ws.link_prog()
            .success()
            .stderr(predicate::str::contains("Using link-cache of prog"))
            .stderr(predicate::str::contains("Cache hit, touching prog"));

        assert!(ws.read("prog").starts_with("main-v1"));
        assert!(ws.mtime("prog") > FileTime::from_unix_time(4_000, 0));
    }

    #[test]
    fn internal_change_stops_at_shared_library() {
        let ws = Workspace::new();
        ws.build_all();
        ws.settle();

        ws.write("foo.o", "foo-v2\n");
        ws.pin("foo.o", 5_000);

        ws.link_libfoo()
            .success()
            .stderr(predicate::str::contains("Input file has changed foo.o"))
            .stderr(predicate::str::contains("Cache miss, executing subcommand"));
        assert_eq!(ws.read("libfoo.so"), "foo-v2\n");
        assert_eq!(ws.mtime("libfoo.so.apid"), FileTime::from_unix_time(2_000, 0));

        ws.link_libbar()
            .success()
            .stderr(predicate::str::contains("Input object is cache OK: libfoo.so"))
            .stderr(predicate::str::contains("Cache hit, touching libbar.so"));

        ws.link_prog()
            .success()
            .stderr(predicate::str::contains("Input object is cache OK: libbar.so"))
            .stderr(predicate::str::contains("Input object is cache OK: libfoo.so"))
            .stderr(predicate::str::contains("Cache hit, touching prog"));

        assert_eq!(ws.read("libbar.so"), "bar-v1\nfoo-v1\n");
    }

    #[test]
    fn api_change_relinks_dependents() {
        let ws = Workspace::new();
        ws.build_all();
        ws.settle();

        ws.write("foo.o", "foo-v2\n");
        ws.pin("foo.o", 5_000);
        ws.write("libfoo.so.api", "api-v2\n");

        ws.link_libfoo().success();
        assert_eq!(ws.read("libfoo.so.apid"), "api-v2\n");

        ws.link_libbar()
            .success()
            .stderr(predicate::str::contains("Shared object API has changed: libfoo.so"));
        assert_eq!(ws.read("libbar.so"), "bar-v1\nfoo-v2\n");
    }

    #[test]
    fn missing_api_digest_relinks() {
        let ws = Workspace::new();
        ws.build_all();
        ws.settle();
        fs::remove_file(ws.path("libfoo.so.apid")).unwrap();
        ws.pin("libfoo.so", 3_500);

        ws.link_libbar().success().stderr(predicate::str::contains(
            "Shared object has changed and there is no API digest: libfoo.so",
        ));
    }

    #[test]
    fn changed_arguments_relink() {
        let ws = Workspace::new();
        ws.build_all();
        ws.settle();

        ws.link(&["-O2", "main.o", "libbar.so", "libfoo.so", "-o", "prog"])
            .success()
            .stderr(predicate::str::contains("Cacheinfo has changed"));
    }

    #[test]
    fn tracked_environment_is_fingerprinted() {
        let ws = Workspace::new();
        ws.build_all();
        ws.settle();

        ws.cmd()
            .env("LD_LIBRARY_PATH", "/opt/lib")
            .args(["fakeld", "main.o", "libbar.so", "libfoo.so", "-o", "prog"])
            .assert()
            .success()
            .stderr(predicate::str::contains("Cacheinfo has changed"));
    }

    #[test]
    fn untracked_environment_is_ignored() {
        let ws = Workspace::new();
        ws.build_all();
        ws.settle();

        ws.cmd()
            .env("LINKCACHE_TEST_UNRELATED", "1")
            .args(["fakeld", "main.o", "libbar.so", "libfoo.so", "-o", "prog"])
            .assert()
            .success()
            .stderr(predicate::str::contains("Cache hit, touching prog"));
    }

    #[test]
    fn corrupt_cacheinfo_relinks() {
        let ws = Workspace::new();
        ws.build_all();
        ws.settle();
        ws.write("prog.cacheinfo", "{ truncated");

        ws.link_prog()
            .success()
            .stderr(predicate::str::contains("malformed cacheinfo sidecar"));
        assert!(ws.read("prog.cacheinfo").contains("\"hash\""));
    }

    #[test]
    fn failure_purges_sidecars() {
        let ws = Workspace::new();
        ws.build_all();
        assert!(ws.path("libfoo.so.apid").exists());

        ws.cmd()
            .args(["sh", "-c", "exit 4", "sh", "-o", "libfoo.so"])
            .assert()
            .code(4);

        assert!(!ws.path("libfoo.so.cacheinfo").exists());
        assert!(!ws.path("libfoo.so.apid").exists());
    }

    #[test]
    fn wrapped_output_passes_through() {
        let ws = Workspace::new();

        ws.cmd()
            .args(["sh", "-c", "echo to-stdout; echo to-stderr >&2", "sh"])
            .assert()
            .success()
            .stdout("to-stdout\n")
            .stderr(predicate::str::contains("to-stderr"))
            .stderr(predicate::str::contains(
                "Command doesn't have a recognizable output",
            ));
    }

    #[test]
    fn missing_oracle_runs_uncached() {
        let ws = Workspace::new();
        fs::remove_file(ws.bin.path().join("linkhash")).unwrap();

        ws.cmd()
            .args(["sh", "-c", "echo built > \"$2\"; exit 5", "sh", "-o", "prog"])
            .assert()
            .code(5);

        assert_eq!(ws.read("prog"), "built\n");
        assert!(!ws.path("prog.cacheinfo").exists());
    }

    #[test]
    fn uncached_exec_failure_exits_one() {
        let ws = Workspace::new();
        fs::remove_file(ws.bin.path().join("linkhash")).unwrap();

        ws.cmd()
            .args(["/no/such/linker", "foo.o", "-o", "prog"])
            .assert()
            .code(1)
            .stderr(predicate::str::contains("/no/such/linker"));

        assert!(!ws.path("prog").exists());
        assert!(!ws.path("prog.cacheinfo").exists());
    }

    #[test]
    fn invalid_config_falls_back_to_defaults() {
        let ws = Workspace::new();
        let config = ws.bin.path().join("broken.toml");
        fs::write(&config, "[cache\n").unwrap();

        ws.cmd()
            .env("LINKCACHE_CONFIG", &config)
            .args(["fakeld", "-shared", "foo.o", "-o", "libfoo.so"])
            .assert()
            .success()
            .stderr(predicate::str::contains("Invalid configuration"));

        assert_eq!(ws.read("libfoo.so"), "foo-v1\n");
        assert_eq!(ws.read("libfoo.so.apid"), "api-stable\n");
    }

    #[test]
    fn config_changes_shared_object_suffix() {
        let ws = Workspace::new();
        let config = ws.bin.path().join("config.toml");
        fs::write(&config, "[cache]\nshared_object_suffix = \".dylib\"\n").unwrap();

        ws.cmd()
            .env("LINKCACHE_CONFIG", &config)
            .args(["fakeld", "-shared", "foo.o", "-o", "libfoo.dylib"])
            .assert()
            .success();

        assert_eq!(ws.read("libfoo.dylib.apid"), "api-stable\n");
    }
}
