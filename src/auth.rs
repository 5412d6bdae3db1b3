use anyhow::{Result, bail};
use std::io::{self, BufRead, IsTerminal};
use zeroize::Zeroizing;

pub const PASSWORD_ENV: &str = "NOTEVAULT_PASSWORD";
pub const NEW_PASSWORD_ENV: &str = "NOTEVAULT_NEW_PASSWORD";

pub fn read_password() -> Result<Zeroizing<String>> {
    //  NOTEVAULT_PASSWORD="supersecret" notevault list
    if let Some(pw) = from_env(PASSWORD_ENV) {
        return Ok(pw);
    }

    //  echo "supersecret" | notevault list
    if !io::stdin().is_terminal() {
        let mut buf = Zeroizing::new(String::new());
        io::stdin().read_line(&mut buf)?;
        trim_newline(&mut buf);

        if !buf.is_empty() {
            return Ok(buf);
        }
    }

    if io::stdin().is_terminal() {
        let pw = Zeroizing::new(rpassword::prompt_password("Password: ")?);
        if !pw.is_empty() {
            return Ok(pw);
        }
    }

    bail!("No password provided")
}

/// A new password, typed twice on a terminal.
///
/// Non-interactive callers pass it through `NOTEVAULT_NEW_PASSWORD`, or as
/// two lines on stdin.
pub fn read_new_password_with_confirmation() -> Result<Zeroizing<String>> {
    if let Some(pw) = from_env(NEW_PASSWORD_ENV) {
        return Ok(pw);
    }

    if !io::stdin().is_terminal() {
        let stdin = io::stdin();
        let mut handle = stdin.lock();

        let mut pw1 = Zeroizing::new(String::new());
        let mut pw2 = Zeroizing::new(String::new());

        handle.read_line(&mut pw1)?;
        handle.read_line(&mut pw2)?;

        trim_newline(&mut pw1);
        trim_newline(&mut pw2);

        return confirm(pw1, pw2);
    }

    let pw1 = Zeroizing::new(rpassword::prompt_password("New password: ")?);
    let pw2 = Zeroizing::new(rpassword::prompt_password("Confirm password: ")?);

    confirm(pw1, pw2)
}

fn confirm(pw1: Zeroizing<String>, pw2: Zeroizing<String>) -> Result<Zeroizing<String>> {
    if pw1.is_empty() {
        bail!("password cannot be empty");
    }

    if pw1 != pw2 {
        bail!("passwords do not match");
    }

    Ok(pw1)
}

fn from_env(name: &str) -> Option<Zeroizing<String>> {
    std::env::var(name)
        .ok()
        .filter(|pw| !pw.is_empty())
        .map(Zeroizing::new)
}

fn trim_newline(s: &mut String) {
    while s.ends_with('\n') || s.ends_with('\r') {
        s.pop();
    }
}
