use anyhow::{anyhow, Context, Result};
use std::collections::{HashMap, HashSet};
use std::env;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

const PROJECT_FILE: &str = ".epdsiftrc";
const MAX_ALIAS_DEPTH: usize = 10;

/// Configuration file handler for epdsift
#[derive(Debug, Default, PartialEq)]
pub struct ConfigFile {
    pub defaults: Option<String>,
    pub aliases: HashMap<String, String>,
}

impl ConfigFile {
    /// Find project-level .epdsiftrc by walking up from the working directory
    pub fn find_project_config() -> Option<PathBuf> {
        let mut current = env::current_dir().ok()?;
        loop {
            let candidate = current.join(PROJECT_FILE);
            if candidate.is_file() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    /// User config locations in order of preference
    pub fn user_config_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        if cfg!(windows) {
            if let Ok(appdata) = env::var("APPDATA") {
                paths.push(PathBuf::from(appdata).join("epdsift").join("config.ini"));
            }
            if let Ok(profile) = env::var("USERPROFILE") {
                paths.push(PathBuf::from(profile).join(PROJECT_FILE));
            }
        } else {
            // $XDG_CONFIG_HOME, falling back to ~/.config
            let config_home = env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .or_else(|_| env::var("HOME").map(|home| PathBuf::from(home).join(".config")))
                .unwrap_or_else(|_| PathBuf::from(".config"));
            paths.push(config_home.join("epdsift").join("config.ini"));

            if let Ok(home) = env::var("HOME") {
                paths.push(PathBuf::from(home).join(PROJECT_FILE));
            }
        }

        paths
    }

    /// Load with precedence: project file over the first existing user file
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Some(user_path) = Self::user_config_paths().into_iter().find(|p| p.is_file()) {
            config = config.merged_with(Self::load_from_path(&user_path)?);
        }
        if let Some(project_path) = Self::find_project_config() {
            config = config.merged_with(Self::load_from_path(&project_path)?);
        }

        Ok(config)
    }

    /// Load an explicit `--config-file`, or the usual search when none is given
    pub fn load_with_custom_path(custom_path: Option<&str>) -> Result<Self> {
        match custom_path {
            Some(path) => Self::load_from_path(Path::new(path)),
            None => Self::load(),
        }
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Ok(Self::parse_ini_content(&content))
    }

    /// Parse INI content. Unknown keys and sections are ignored.
    fn parse_ini_content(content: &str) -> Self {
        let mut config = Self::default();
        let mut section = String::new();

        for line in content.lines().map(str::trim) {
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }

            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                section = name.trim().to_string();
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let (key, value) = (key.trim(), value.trim());

            match section.as_str() {
                "" if key == "defaults" => config.defaults = Some(value.to_string()),
                "aliases" => {
                    config.aliases.insert(key.to_string(), value.to_string());
                }
                _ => {}
            }
        }

        config
    }

    /// Overlay `other` on top of `self`; `other` wins on conflicts
    fn merged_with(mut self, other: Self) -> Self {
        if other.defaults.is_some() {
            self.defaults = other.defaults;
        }
        self.aliases.extend(other.aliases);
        self
    }

    /// Expand one alias, following `-a NAME` references inside it
    pub fn resolve_alias(
        &self,
        name: &str,
        seen: &mut HashSet<String>,
        depth: usize,
    ) -> Result<Vec<String>> {
        if depth > MAX_ALIAS_DEPTH {
            return Err(anyhow!("Alias chain too deep: {} levels", depth));
        }
        if !seen.insert(name.to_string()) {
            return Err(anyhow!("Circular dependency detected in alias: {}", name));
        }

        let value = self
            .aliases
            .get(name)
            .ok_or_else(|| anyhow!("Unknown alias: {}", name))?;
        let args = shell_words::split(value)
            .with_context(|| format!("Invalid alias '{}': failed to parse arguments", name))?;

        let mut expanded = Vec::with_capacity(args.len());
        let mut iter = args.into_iter();
        while let Some(arg) = iter.next() {
            if arg == "-a" || arg == "--alias" {
                if let Some(reference) = iter.next() {
                    expanded.extend(self.resolve_alias(&reference, seen, depth + 1)?);
                    continue;
                }
            }
            expanded.push(arg);
        }

        seen.remove(name);
        Ok(expanded)
    }

    /// Prepend `defaults` after the program name, then expand every alias
    pub fn process_args(&self, args: Vec<String>) -> Result<Vec<String>> {
        let mut args = args.into_iter();
        let mut with_defaults: Vec<String> = args.next().into_iter().collect();

        if let Some(defaults) = &self.defaults {
            let default_args = shell_words::split(defaults)
                .context("Invalid defaults: failed to parse arguments")?;
            with_defaults.extend(default_args);
        }
        with_defaults.extend(args);

        let mut processed = Vec::with_capacity(with_defaults.len());
        let mut iter = with_defaults.into_iter();
        while let Some(arg) = iter.next() {
            if arg == "-a" || arg == "--alias" {
                if let Some(name) = iter.next() {
                    let mut seen = HashSet::new();
                    processed.extend(self.resolve_alias(&name, &mut seen, 0)?);
                    continue;
                }
            }
            processed.push(arg);
        }

        Ok(processed)
    }

    /// Report for `--show-config`
    pub fn describe() -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Configuration precedence: CLI > project {} > user config > defaults\n",
            PROJECT_FILE
        );

        let project_path = Self::find_project_config();
        let user_paths = Self::user_config_paths();
        let user_path = user_paths.iter().find(|p| p.is_file());

        match Self::load() {
            Ok(merged) => {
                match (&project_path, user_path) {
                    (None, None) => {
                        let _ = writeln!(out, "No configuration files found. Using defaults.");
                    }
                    (project, user) => {
                        let _ = writeln!(out, "Configuration loaded from:");
                        if let Some(path) = project {
                            let _ = writeln!(out, "  Project: {}", path.display());
                        }
                        if let Some(path) = user {
                            let _ = writeln!(out, "  User: {}", path.display());
                        }
                    }
                }

                if let Some(defaults) = &merged.defaults {
                    let _ = writeln!(out, "\nActive defaults:\n  defaults = {}", defaults);
                }
                if !merged.aliases.is_empty() {
                    let _ = writeln!(out, "\nActive aliases:");
                    let mut sorted: Vec<_> = merged.aliases.iter().collect();
                    sorted.sort_by_key(|(name, _)| name.as_str());
                    for (name, value) in sorted {
                        let _ = writeln!(out, "  {} = {}", name, value);
                    }
                }
            }
            Err(e) => {
                let _ = writeln!(out, "Error loading configuration: {}", e);
            }
        }

        let _ = writeln!(out, "\nConfiguration search locations (in precedence order):");
        match &project_path {
            Some(path) => {
                let _ = writeln!(out, "  1. Project: {} (found)", path.display());
            }
            None => {
                let _ = writeln!(
                    out,
                    "  1. Project: {} (searched up directory tree, not found)",
                    PROJECT_FILE
                );
            }
        }
        for (i, path) in user_paths.iter().enumerate() {
            let status = if path.is_file() { "(found)" } else { "(not found)" };
            let _ = writeln!(out, "  {}. User: {} {}", i + 2, path.display(), status);
        }

        if project_path.is_none() && user_path.is_none() {
            let _ = writeln!(out, "\nExample configuration file ({}):\n", PROJECT_FILE);
            let _ = writeln!(out, "# Arguments applied to every epdsift command");
            let _ = writeln!(out, "defaults = --workers 8 --elo 2200");
            let _ = writeln!(out, "\n[aliases]");
            let _ = writeln!(out, "sicilian = --eco B2 --max-ply 30");
            let _ = writeln!(out, "openings = --min-ply 1 --max-ply 16 --elo 2500");
        }

        out
    }
}
