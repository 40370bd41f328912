//! Kickstart rendering for installer ISOs

use std::path::Path;

use crate::error::{AppError, Result};

const DEFAULT_TEMPLATE: &str = r#"# Generated by edgebuild
lang en_US.UTF-8
keyboard us
timezone UTC
zerombr
clearpart --all --initlabel
autopart --type=plain --fstype=xfs --nohome
reboot
text
network --bootproto=dhcp

ostreesetup --nogpg --osname=rhel-edge --remote=rhel-edge --url=file:///run/install/repo/ostree/repo --ref=rhel/9/x86_64/edge

user --name={{username}} --groups=wheel
sshkey --username={{username}} "{{ssh_key}}"

%post
echo -e '{{username}}\tALL=(ALL)\tNOPASSWD: ALL' >> /etc/sudoers
%end
"#;

const SSH_KEY_PREFIXES: &[&str] = &["ssh-rsa ", "ssh-ed25519 ", "ecdsa-sha2-", "sk-"];

/// Load the configured template, or the embedded one
pub async fn load_template(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => Ok(tokio::fs::read_to_string(path).await?),
        None => Ok(DEFAULT_TEMPLATE.to_string()),
    }
}

/// Check the user data an installer is customized with
pub fn validate_user_info(username: &str, ssh_key: &str) -> Result<()> {
    let mut chars = username.chars();
    let valid_name = match chars.next() {
        Some(first) if first.is_ascii_lowercase() || first == '_' => chars
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-'),
        _ => false,
    };
    if !valid_name || username.len() > 32 || username == "root" {
        return Err(AppError::BadRequest(format!(
            "Invalid installer username: {}",
            username
        )));
    }

    let key = ssh_key.trim();
    let known_type = SSH_KEY_PREFIXES.iter().any(|p| key.starts_with(p));
    if !known_type || key.contains('\n') || key.contains('"') {
        return Err(AppError::BadRequest("Invalid installer SSH key".to_string()));
    }

    Ok(())
}

/// Substitute the user placeholders in `template`
pub fn render_kickstart(template: &str, username: &str, ssh_key: &str) -> Result<String> {
    validate_user_info(username, ssh_key)?;
    Ok(template
        .replace("{{username}}", username)
        .replace("{{ssh_key}}", ssh_key.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIMk admin@fleet";

    #[test]
    fn test_render_default_template() {
        let rendered = render_kickstart(DEFAULT_TEMPLATE, "fleet", KEY).unwrap();
        assert!(rendered.contains("user --name=fleet --groups=wheel"));
        assert!(rendered.contains(&format!("sshkey --username=fleet \"{}\"", KEY)));
        assert!(!rendered.contains("{{"));
    }

    #[test]
    fn test_rejects_bad_usernames() {
        for name in ["", "Root", "root", "9lives", "a b", "x;rm"] {
            assert!(validate_user_info(name, KEY).is_err(), "{name} accepted");
        }
        assert!(validate_user_info("edge_admin-1", KEY).is_ok());
    }

    #[test]
    fn test_rejects_bad_keys() {
        assert!(validate_user_info("fleet", "not a key").is_err());
        assert!(validate_user_info("fleet", "ssh-rsa AAA\nuser --name=evil").is_err());
        assert!(validate_user_info("fleet", "ssh-rsa AAA\" --evil").is_err());
    }

    #[tokio::test]
    async fn test_load_template_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ks.tmpl");
        std::fs::write(&path, "user --name={{username}}").unwrap();

        let template = load_template(Some(&path)).await.unwrap();
        assert_eq!(
            render_kickstart(&template, "fleet", KEY).unwrap(),
            "user --name=fleet"
        );
        assert_eq!(load_template(None).await.unwrap(), DEFAULT_TEMPLATE);
    }
}
