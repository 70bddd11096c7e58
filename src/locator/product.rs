use serde::{Deserialize, Serialize};

use crate::platform::registry::{Hive, RegistryKeyRef};

/// Everything product-specific: where it lives, what it runs as, and which
/// registry entries belong to it.
///
/// Defaults describe Visual Studio Code on Windows. Scalar and list fields
/// come before the key tables so the TOML form stays readable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Product {
    /// Human-readable name
    pub name: String,

    /// Install directory name under the program roots
    pub install_dir_name: String,

    /// User-data directory names under the roaming app-data root
    pub app_data_dirs: Vec<String>,

    /// Dot-directories under the user profile
    pub profile_dirs: Vec<String>,

    /// Cache directories, relative to local app-data
    pub cache_dirs: Vec<String>,

    /// Extra directories swept by the ultimate profile, relative to the temp root
    pub temp_dirs: Vec<String>,

    /// Glob patterns matched inside the temp roots by system cleanup
    pub temp_patterns: Vec<String>,

    /// Prefetch glob pattern, relative to `<SystemRoot>/Prefetch`
    pub prefetch_pattern: String,

    /// Executable names that always belong to the product
    pub process_names: Vec<String>,

    /// Shared runtime names that only match when the executable lives
    /// inside the install directory
    pub shared_process_names: Vec<String>,

    /// Lower-cased needle matched against uninstall `DisplayName` values
    pub uninstall_display_name: String,

    /// Registry value / JSON key names that carry the machine identifier
    pub identifier_keys: Vec<String>,

    /// Name of the value holding the identifier itself
    pub identifier_value: String,

    /// Telemetry and crash subtrees, relative to each user-data root
    pub telemetry_dirs: Vec<String>,

    /// File-association extensions removed under HKCR by the complete profile
    pub file_extensions: Vec<String>,

    /// Shell context-menu keys removed under HKCR by the complete profile
    pub context_menu_keys: Vec<String>,

    /// Product registry root holding the identifier values
    pub registry_root: RegistryKeyRef,

    /// Keys removed by every profile
    pub registry_keys: Vec<RegistryKeyRef>,

    /// Keys exported into the backup
    pub backup_keys: Vec<RegistryKeyRef>,

    /// Uninstall subtree scanned by the ultimate profile
    pub uninstall_root: RegistryKeyRef,
}

impl Default for Product {
    fn default() -> Self {
        let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        let registry_keys = vec![
            RegistryKeyRef::new(Hive::CurrentUser, r"SOFTWARE\Classes\Applications\Code.exe"),
            RegistryKeyRef::new(Hive::CurrentUser, r"SOFTWARE\Classes\vscode"),
            RegistryKeyRef::new(Hive::LocalMachine, r"SOFTWARE\Classes\Applications\Code.exe"),
            RegistryKeyRef::new(Hive::LocalMachine, r"SOFTWARE\Classes\vscode"),
        ];
        let registry_root = RegistryKeyRef::new(Hive::CurrentUser, r"SOFTWARE\Microsoft\VSCode");

        let mut backup_keys = registry_keys.clone();
        backup_keys.insert(2, registry_root.clone());

        Self {
            name: "Visual Studio Code".to_string(),
            install_dir_name: "Microsoft VS Code".to_string(),
            app_data_dirs: strings(&["Code", "Code - Insiders"]),
            profile_dirs: strings(&[".vscode", ".vscode-insiders"]),
            cache_dirs: strings(&["Microsoft/VSCode"]),
            temp_dirs: strings(&["vscode"]),
            temp_patterns: strings(&["*vscode*"]),
            prefetch_pattern: "*CODE*.pf".to_string(),
            process_names: strings(&["Code.exe", "code", "CodeHelper.exe", "VSCodeSetup.exe"]),
            shared_process_names: strings(&["electron.exe", "node.exe"]),
            uninstall_display_name: "visual studio code".to_string(),
            identifier_keys: strings(&["machineId", "sessionId", "telemetry.machineId", "sqmUserId"]),
            identifier_value: "machineId".to_string(),
            telemetry_dirs: strings(&[
                "User/globalStorage/vscode.vscode-telemetry",
                "User/globalStorage/ms-vscode.vscode-telemetry",
                "CrashDumps",
                "CachedData",
            ]),
            file_extensions: strings(&[".js", ".ts", ".json", ".html", ".css", ".py", ".cpp", ".java"]),
            context_menu_keys: strings(&[
                r"*\shell\VSCode",
                r"Directory\shell\VSCode",
                r"Directory\Background\shell\VSCode",
            ]),
            registry_root,
            registry_keys,
            backup_keys,
            uninstall_root: RegistryKeyRef::new(
                Hive::LocalMachine,
                r"SOFTWARE\Microsoft\Windows\CurrentVersion\Uninstall",
            ),
        }
    }
}

impl Product {
    /// File-association and context-menu keys under HKCR
    pub fn shell_integration_keys(&self) -> Vec<RegistryKeyRef> {
        self.file_extensions
            .iter()
            .chain(self.context_menu_keys.iter())
            .map(|k| RegistryKeyRef::new(Hive::ClassesRoot, k))
            .collect()
    }

    /// Does a live process belong to the product?
    pub fn matches_process(&self, name: &str, exe: Option<&str>) -> bool {
        let name = name.to_lowercase();
        if self.process_names.iter().any(|p| p.to_lowercase() == name) {
            return true;
        }
        let install = self.install_dir_name.to_lowercase();
        self.shared_process_names.iter().any(|p| p.to_lowercase() == name)
            && exe.is_some_and(|e| e.to_lowercase().contains(&install))
    }

    /// Case-insensitive substring match against an uninstall display name
    pub fn matches_display_name(&self, display_name: &str) -> bool {
        display_name
            .to_lowercase()
            .contains(&self.uninstall_display_name.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_names_match_case_insensitively() {
        let product = Product::default();
        assert!(product.matches_process("code.exe", None));
        assert!(product.matches_process("CODE.EXE", Some("C:\\anywhere\\Code.exe")));
        assert!(!product.matches_process("explorer.exe", None));
    }

    #[test]
    fn test_shared_runtime_needs_install_path() {
        let product = Product::default();
        assert!(!product.matches_process("node.exe", None));
        assert!(!product.matches_process("node.exe", Some("C:\\nodejs\\node.exe")));
        assert!(product.matches_process(
            "node.exe",
            Some("C:\\Users\\a\\AppData\\Local\\Programs\\Microsoft VS Code\\node.exe")
        ));
    }

    #[test]
    fn test_display_name_substring_match() {
        let product = Product::default();
        assert!(product.matches_display_name("Microsoft Visual Studio Code (User)"));
        assert!(product.matches_display_name("VISUAL STUDIO CODE"));
        assert!(!product.matches_display_name("Visual Studio 2022"));
    }

    #[test]
    fn test_backup_keys_cover_removed_keys_and_root() {
        let product = Product::default();
        for key in &product.registry_keys {
            assert!(product.backup_keys.contains(key));
        }
        assert!(product.backup_keys.contains(&product.registry_root));
        assert_eq!(product.shell_integration_keys().len(), 11);
    }
}
