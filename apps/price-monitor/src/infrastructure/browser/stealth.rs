//! Anti-Detection Profile
//!
//! Identity presented by the render session: user agent, platform,
//! languages and window size, plus suppression of the usual automation
//! markers. The launch-time part becomes browser arguments; the in-page part
//! is an init script that must be evaluated again after every reload.

use serde::{Deserialize, Serialize};

/// Browser identity and automation-marker suppression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AntiDetectionConfig {
    /// `User-Agent` header and `navigator.userAgent`.
    pub user_agent: String,
    /// `navigator.platform`.
    pub platform: String,
    /// `Accept-Language` header, also split into `navigator.languages`.
    pub accept_language: String,
    /// Browser UI locale (`--lang`).
    pub locale: String,
    /// Window size in CSS pixels.
    pub viewport: (u32, u32),
    /// Hide `navigator.webdriver` and the automation-controlled blink
    /// feature.
    pub hide_webdriver_flag: bool,
    /// Extra launch arguments appended verbatim.
    pub extra_args: Vec<String>,
}

impl Default for AntiDetectionConfig {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
            platform: "MacIntel".to_string(),
            accept_language: "zh-CN,zh,en-US,en".to_string(),
            locale: "zh-CN".to_string(),
            viewport: (1440, 900),
            hide_webdriver_flag: true,
            extra_args: Vec::new(),
        }
    }
}

impl AntiDetectionConfig {
    /// Browser command-line arguments for this profile.
    #[must_use]
    pub fn launch_args(&self) -> Vec<String> {
        let (width, height) = self.viewport;
        let mut args = vec![
            format!("--user-agent={}", self.user_agent),
            format!("--lang={}", self.locale),
            format!("--window-size={width},{height}"),
            "--no-first-run".to_string(),
            "--no-default-browser-check".to_string(),
            "--disable-dev-shm-usage".to_string(),
        ];
        if self.hide_webdriver_flag {
            args.push("--disable-blink-features=AutomationControlled".to_string());
            args.push("--disable-infobars".to_string());
        }
        args.extend(self.extra_args.iter().cloned());
        args
    }

    /// Languages for `navigator.languages`, quality values stripped.
    #[must_use]
    pub fn languages(&self) -> Vec<String> {
        self.accept_language
            .split(',')
            .map(|l| l.split(';').next().unwrap_or_default().trim().to_string())
            .filter(|l| !l.is_empty())
            .collect()
    }

    /// Script evaluated in every new document and after reloads.
    #[must_use]
    pub fn init_script(&self) -> String {
        let platform = serde_json::Value::String(self.platform.clone());
        let languages = serde_json::Value::from(self.languages());

        let mut script = String::from("(() => {\n");
        script.push_str("  const define = (obj, prop, value) => {\n");
        script.push_str("    try { Object.defineProperty(obj, prop, { get: () => value, configurable: true }); } catch (_) {}\n");
        script.push_str("  };\n");
        if self.hide_webdriver_flag {
            script.push_str("  define(Navigator.prototype, 'webdriver', undefined);\n");
            script.push_str("  if (!window.chrome) { window.chrome = { runtime: {} }; }\n");
            script.push_str("  define(navigator, 'plugins', [1, 2, 3, 4, 5]);\n");
        }
        script.push_str(&format!("  define(navigator, 'platform', {platform});\n"));
        script.push_str(&format!("  define(navigator, 'languages', {languages});\n"));
        script.push_str("})();\n");
        script
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_profile_looks_like_desktop_chrome() {
        let config = AntiDetectionConfig::default();
        assert!(config.user_agent.contains("Macintosh"));
        assert!(config.user_agent.contains("Chrome/120"));
        assert_eq!(config.viewport, (1440, 900));
        assert_eq!(config.languages(), ["zh-CN", "zh", "en-US", "en"]);
    }

    #[test]
    fn launch_args_include_identity_and_marker_suppression() {
        let config = AntiDetectionConfig {
            extra_args: vec!["--mute-audio".to_string()],
            ..AntiDetectionConfig::default()
        };
        let args = config.launch_args();

        assert!(args.contains(&"--lang=zh-CN".to_string()));
        assert!(args.contains(&"--window-size=1440,900".to_string()));
        assert!(args.contains(&"--disable-blink-features=AutomationControlled".to_string()));
        assert!(args.iter().any(|a| a.starts_with("--user-agent=Mozilla/5.0")));
        assert_eq!(args.last().map(String::as_str), Some("--mute-audio"));
    }

    #[test]
    fn markers_can_be_left_visible() {
        let config = AntiDetectionConfig {
            hide_webdriver_flag: false,
            ..AntiDetectionConfig::default()
        };
        assert!(!config.launch_args().iter().any(|a| a.contains("AutomationControlled")));
        assert!(!config.init_script().contains("webdriver"));
    }

    #[test]
    fn init_script_masks_navigator() {
        let script = AntiDetectionConfig::default().init_script();
        assert!(script.contains("'webdriver', undefined"));
        assert!(script.contains(r#"'platform', "MacIntel""#));
        assert!(script.contains(r#"["zh-CN","zh","en-US","en"]"#));
    }

    #[test]
    fn languages_strip_quality_values() {
        let config = AntiDetectionConfig {
            accept_language: "en-US,en;q=0.9, de;q=0.5".to_string(),
            ..AntiDetectionConfig::default()
        };
        assert_eq!(config.languages(), ["en-US", "en", "de"]);
    }
}
