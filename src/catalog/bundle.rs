use crate::executor;
use crate::model::InstalledApp;
use log::debug;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static STRING_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<key>\s*([^<]+?)\s*</key>\s*<string>([^<]*)</string>").expect("static regex")
});

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InfoPlist {
    pub bundle_id: Option<String>,
    pub version: Option<String>,
    pub icon_file: Option<String>,
}

fn unescape(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Pulls the string-valued keys we care about out of an XML property list.
pub fn parse_info_plist(content: &str) -> Option<InfoPlist> {
    if !content.contains("<plist") {
        return None;
    }
    let mut info = InfoPlist::default();
    for caps in STRING_ENTRY.captures_iter(content) {
        let value = unescape(caps[2].trim());
        match &caps[1] {
            "CFBundleIdentifier" => info.bundle_id = Some(value),
            "CFBundleShortVersionString" => info.version = Some(value),
            "CFBundleIconFile" => info.icon_file = Some(value),
            _ => {}
        }
    }
    Some(info)
}

fn read_plist(path: &Path) -> Option<String> {
    let bytes = fs::read(path).ok()?;
    if !bytes.starts_with(b"bplist") {
        return String::from_utf8(bytes).ok();
    }
    // Binary plists are converted by the system tool where it exists.
    if !cfg!(target_os = "macos") {
        return None;
    }
    let args = [
        "-convert".to_string(),
        "xml1".to_string(),
        "-o".to_string(),
        "-".to_string(),
        path.to_string_lossy().into_owned(),
    ];
    executor::capture_output("/usr/bin/plutil", &args).ok()
}

pub fn display_name(bundle: &Path) -> Option<String> {
    let file_name = bundle.file_name()?.to_string_lossy().into_owned();
    let lower = file_name.to_ascii_lowercase();
    Some(match lower.strip_suffix(".app") {
        Some(_) => file_name[..file_name.len() - 4].to_string(),
        None => file_name,
    })
}

fn icon_path(bundle: &Path, icon_file: &str) -> PathBuf {
    let resources = bundle.join("Contents/Resources");
    if Path::new(icon_file).extension().is_some() {
        resources.join(icon_file)
    } else {
        resources.join(format!("{icon_file}.icns"))
    }
}

/// Introspects an `.app` bundle. `None` means it could not be read.
pub fn read_bundle(bundle: &Path) -> Option<InstalledApp> {
    if !bundle.is_dir() {
        debug!("bundle: {:?} is not a directory", bundle);
        return None;
    }
    let plist = bundle.join("Contents/Info.plist");
    let Some(info) = read_plist(&plist).as_deref().and_then(parse_info_plist) else {
        debug!("bundle: unreadable {:?}", plist);
        return None;
    };

    Some(InstalledApp {
        bundle_id: info.bundle_id.unwrap_or_else(|| "unknown".to_string()),
        name: display_name(bundle)?,
        version: info.version.unwrap_or_else(|| "unknown".to_string()),
        install_path: bundle.to_path_buf(),
        icon: info.icon_file.map(|f| icon_path(bundle, &f)),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn info_plist(bundle_id: &str, version: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>CFBundleIdentifier</key>
    <string>{bundle_id}</string>
    <key>CFBundleShortVersionString</key>
    <string>{version}</string>
    <key>CFBundleIconFile</key>
    <string>AppIcon</string>
    <key>LSRequiresNativeExecution</key>
    <true/>
</dict>
</plist>"#
        )
    }

    pub(crate) fn make_app(dir: &Path, name: &str, bundle_id: &str) -> PathBuf {
        let bundle = dir.join(name);
        fs::create_dir_all(bundle.join("Contents")).unwrap();
        fs::write(bundle.join("Contents/Info.plist"), info_plist(bundle_id, "1.2.3")).unwrap();
        bundle
    }

    #[test]
    fn parses_string_keys() {
        let info = parse_info_plist(&info_plist("dev.zed.Zed", "0.160")).unwrap();
        assert_eq!(info.bundle_id.as_deref(), Some("dev.zed.Zed"));
        assert_eq!(info.version.as_deref(), Some("0.160"));
        assert_eq!(info.icon_file.as_deref(), Some("AppIcon"));
        assert!(parse_info_plist("not a plist").is_none());
    }

    #[test]
    fn reads_a_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = make_app(dir.path(), "Zed.APP", "dev.zed.Zed");
        let app = read_bundle(&bundle).unwrap();
        assert_eq!(app.name, "Zed");
        assert_eq!(app.bundle_id, "dev.zed.Zed");
        assert_eq!(app.version, "1.2.3");
        assert_eq!(app.icon, Some(bundle.join("Contents/Resources/AppIcon.icns")));
    }

    #[test]
    fn missing_keys_fall_back_and_unreadable_bundles_are_none() {
        let dir = tempfile::tempdir().unwrap();
        let bare = dir.path().join("Bare.app");
        fs::create_dir_all(bare.join("Contents")).unwrap();
        fs::write(bare.join("Contents/Info.plist"), "<plist version=\"1.0\"><dict></dict></plist>").unwrap();
        let app = read_bundle(&bare).unwrap();
        assert_eq!(app.bundle_id, "unknown");
        assert_eq!(app.version, "unknown");
        assert!(app.icon.is_none());

        let broken = dir.path().join("Broken.app");
        fs::create_dir_all(&broken).unwrap();
        assert!(read_bundle(&broken).is_none());
    }
}
