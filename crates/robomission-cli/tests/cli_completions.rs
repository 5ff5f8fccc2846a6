// Test module - relaxed lint rules
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(missing_docs)]

//! Shell completions cover every subcommand of the binary.

use std::process::Command;

const SUBCOMMANDS: [&str; 4] = ["run", "validate", "list", "completions"];

fn completions(shell: &str) -> String {
    let output = Command::new(env!("CARGO_BIN_EXE_robomission"))
        .args(["completions", shell])
        .output()
        .expect("failed to execute robomission");
    assert!(
        output.status.success(),
        "completions {shell} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).unwrap()
}

#[test]
fn bash_completions_offer_every_subcommand() {
    let script = completions("bash");
    assert!(script.contains("_robomission()"));
    for name in SUBCOMMANDS {
        assert!(script.contains(name), "bash completions lack `{name}`");
    }
    assert!(script.contains("--missions-dir"));
}

#[test]
fn fish_completions_describe_run_and_its_flags() {
    let script = completions("fish");
    for name in SUBCOMMANDS {
        assert!(
            script.contains(&format!("-a \"{name}\"")),
            "fish completions lack `{name}`"
        );
    }
    assert!(script.contains("-l timeout-secs"));
    assert!(script.contains("-l sim-task-ms"));
}

#[test]
fn unknown_shell_is_rejected() {
    let status = Command::new(env!("CARGO_BIN_EXE_robomission"))
        .args(["completions", "powershell-classic"])
        .status()
        .unwrap();
    assert!(!status.success());
}
