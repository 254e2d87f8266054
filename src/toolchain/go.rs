use super::Toolchain;

pub struct Go;

impl Toolchain for Go {
    fn name(&self) -> &'static str {
        "go"
    }

    fn executable(&self) -> &'static str {
        "go"
    }

    fn archive_root(&self) -> &'static str {
        "go"
    }

    fn listing_url(&self) -> &'static str {
        "https://go.dev/dl/"
    }

    fn root_env_var(&self) -> &'static str {
        "GOROOT"
    }

    fn workspace_env_var(&self) -> &'static str {
        "GOPATH"
    }

    fn version_pattern(&self) -> &'static str {
        r"go version go(\d+\.\d+\.\d+) (\S+/\S+)"
    }

    fn platform_tag(&self, os: &str, arch: &str) -> Option<String> {
        // Windows releases ship as .zip, which we don't extract.
        let os = match os {
            "linux" | "android" => "linux",
            "macos" => "darwin",
            "freebsd" => "freebsd",
            _ => return None,
        };
        let arch = match arch {
            "x86_64" => "amd64",
            "aarch64" => "arm64",
            "x86" => "386",
            "arm" => "armv6l",
            "riscv64" => "riscv64",
            "s390x" => "s390x",
            "loongarch64" => "loong64",
            _ => return None,
        };
        Some(format!("{os}-{arch}"))
    }
}
