//! Content-scanning plugin contract and the external-process scanner
//! (C6, spec.md §3/§4.6), grounded on
//! `contentscanners/commandlinescan.cpp`.

use std::io::Write;
use std::process::{Command, Stdio};

use regex::Regex;

use crate::error::ScanError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Clean,
    Infected { virus_name: Option<String> },
}

pub trait ContentScanPlugin: Send + Sync {
    fn init(&mut self) -> crate::Result<()> {
        Ok(())
    }
    fn quit(&mut self) -> crate::Result<()> {
        Ok(())
    }
    fn scan_memory(&self, data: &[u8]) -> Result<ScanOutcome, ScanError>;
    fn scan_file(&self, path: &std::path::Path) -> Result<ScanOutcome, ScanError>;
}

/// Drives an external command-line scanner, the only concrete plugin
/// this build ships. `commandlinescan.cpp` forks, dups two socketpairs
/// onto fds 1 and 2, and execs the scanner; `std::process::Command`
/// gives the same stdout/stderr capture without the manual fork/dup2
/// dance, and a failed `exec` surfaces as `Command::spawn`'s `Err`
/// directly rather than needing the original's exit-255 sentinel.
pub struct ExternalScanner {
    pub command: String,
    pub args: Vec<String>,
    pub virus_regexp: Option<Regex>,
    pub clean_codes: Vec<i32>,
    pub infected_codes: Vec<i32>,
    /// `Some(true)` = treat an unrecognised exit code as clean,
    /// `Some(false)` = infected, `None` = error.
    pub default_result: Option<bool>,
}

impl ExternalScanner {
    fn interpret(&self, stdout: &str, exit_code: Option<i32>) -> Result<ScanOutcome, ScanError> {
        if let Some(re) = &self.virus_regexp {
            if let Some(captures) = re.captures(stdout) {
                let virus_name = captures.get(1).map(|m| m.as_str().to_string());
                return Ok(ScanOutcome::Infected { virus_name });
            }
        }
        let Some(code) = exit_code else {
            return Err(ScanError::NoDecisionBasis);
        };
        if code == 255 {
            return Err(ScanError::ExecFailed("exec failed".to_string()));
        }
        if self.clean_codes.contains(&code) {
            return Ok(ScanOutcome::Clean);
        }
        if self.infected_codes.contains(&code) {
            return Ok(ScanOutcome::Infected { virus_name: None });
        }
        match self.default_result {
            Some(true) => Ok(ScanOutcome::Clean),
            Some(false) => Ok(ScanOutcome::Infected { virus_name: None }),
            None => Err(ScanError::Undecided),
        }
    }

    fn run(&self, extra_arg: &str) -> Result<ScanOutcome, ScanError> {
        let output = Command::new(&self.command)
            .args(&self.args)
            .arg(extra_arg)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| ScanError::ExecFailed(e.to_string()))?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        self.interpret(&stdout, output.status.code())
    }
}

impl ContentScanPlugin for ExternalScanner {
    fn scan_file(&self, path: &std::path::Path) -> Result<ScanOutcome, ScanError> {
        self.run(&path.display().to_string())
    }

    /// Spills `data` to a temp file first: the reference scanners this
    /// plugin wraps are command-line tools that take a path, not a
    /// stdin stream.
    fn scan_memory(&self, data: &[u8]) -> Result<ScanOutcome, ScanError> {
        let mut tmp = tempfile::NamedTempFile::new().map_err(ScanError::Io)?;
        tmp.write_all(data).map_err(ScanError::Io)?;
        tmp.flush().map_err(ScanError::Io)?;
        self.scan_file(tmp.path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scanner() -> ExternalScanner {
        ExternalScanner {
            command: "/bin/true".to_string(),
            args: vec![],
            virus_regexp: Some(Regex::new(r"FOUND: (\S+)").unwrap()),
            clean_codes: vec![0],
            infected_codes: vec![1],
            default_result: None,
        }
    }

    #[test]
    fn virus_regexp_wins_over_exit_code() {
        let s = scanner();
        let outcome = s.interpret("scanning...\nFOUND: EICAR-Test\n", Some(0)).unwrap();
        assert_eq!(
            outcome,
            ScanOutcome::Infected {
                virus_name: Some("EICAR-Test".to_string())
            }
        );
    }

    #[test]
    fn clean_exit_code_when_no_regexp_match() {
        let s = scanner();
        assert_eq!(s.interpret("all good", Some(0)).unwrap(), ScanOutcome::Clean);
    }

    #[test]
    fn infected_exit_code_when_no_regexp_match() {
        let s = scanner();
        assert_eq!(
            s.interpret("bad file", Some(1)).unwrap(),
            ScanOutcome::Infected { virus_name: None }
        );
    }

    #[test]
    fn unrecognised_code_falls_back_to_default() {
        let mut s = scanner();
        s.default_result = Some(true);
        assert_eq!(s.interpret("?", Some(42)).unwrap(), ScanOutcome::Clean);
    }

    #[test]
    fn unrecognised_code_with_no_default_is_an_error() {
        let s = scanner();
        assert!(matches!(s.interpret("?", Some(42)), Err(ScanError::Undecided)));
    }

    #[test]
    fn missing_exit_code_with_no_regexp_match_is_an_error() {
        let s = scanner();
        assert!(matches!(s.interpret("?", None), Err(ScanError::NoDecisionBasis)));
    }

    #[test]
    fn exit_255_is_always_exec_failed() {
        let mut s = scanner();
        s.clean_codes = vec![255];
        s.default_result = Some(true);
        assert!(matches!(s.interpret("?", Some(255)), Err(ScanError::ExecFailed(_))));
    }
}
