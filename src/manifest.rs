//! Package name discovery from project manifests

use crate::error::{Result, ScanError};
use crate::types::Ecosystem;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const REQUIREMENTS_FILE: &str = "requirements.txt";

/// Package names found per ecosystem, in discovery order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifests {
    pub pypi: Vec<String>,
    pub nuget: Vec<String>,
}

impl Manifests {
    /// Names for one ecosystem
    pub fn names(&self, ecosystem: Ecosystem) -> &[String] {
        match ecosystem {
            Ecosystem::PyPI => &self.pypi,
            Ecosystem::NuGet => &self.nuget,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pypi.is_empty() && self.nuget.is_empty()
    }
}

/// Find package names under `project_path` for the selected ecosystems
pub fn discover(project_path: &Path, ecosystems: &[Ecosystem]) -> Result<Manifests> {
    if !project_path.is_dir() {
        return Err(ScanError::manifest(format!(
            "{} is not a directory",
            project_path.display()
        )));
    }

    let mut manifests = Manifests::default();

    if ecosystems.contains(&Ecosystem::PyPI) {
        let requirements = project_path.join(REQUIREMENTS_FILE);
        if requirements.is_file() {
            let content = std::fs::read_to_string(&requirements)?;
            manifests.pypi = parse_requirements(&content);
            info!("Found {} PyPI packages in {}", manifests.pypi.len(), REQUIREMENTS_FILE);
        } else {
            info!("No {} found in {}", REQUIREMENTS_FILE, project_path.display());
        }
    }

    if ecosystems.contains(&Ecosystem::NuGet) {
        let projects = find_csproj_files(project_path)?;
        if projects.is_empty() {
            info!("No .csproj files found in {}", project_path.display());
        }

        let mut seen = NameSet::default();
        for project in &projects {
            let content = std::fs::read_to_string(project)?;
            for name in parse_csproj(&content)? {
                if seen.insert(&name) {
                    manifests.nuget.push(name);
                }
            }
        }
        info!(
            "Found {} NuGet packages in {} project files",
            manifests.nuget.len(),
            projects.len()
        );
    }

    if manifests.is_empty() {
        return Err(ScanError::manifest(format!(
            "no packages found in {}",
            project_path.display()
        )));
    }

    Ok(manifests)
}

/// Package names from a pip requirements file, without version specifiers
pub fn parse_requirements(content: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut seen = NameSet::default();

    for line in content.lines() {
        let line = line.split('#').next().unwrap_or_default().trim();
        if line.is_empty() || line.starts_with('-') {
            continue;
        }

        let requirement = line.split(';').next().unwrap_or_default();
        let end = requirement
            .find(|c: char| matches!(c, '[' | '=' | '<' | '>' | '~' | '!' | '@' | ' ' | '\t' | ','))
            .unwrap_or(requirement.len());
        let name = requirement[..end].trim();

        if name.is_empty() || name.contains('/') || name.contains(':') {
            debug!("Skipping unsupported requirement line: {}", line);
            continue;
        }
        if seen.insert(name) {
            names.push(name.to_string());
        }
    }

    names
}

/// `PackageReference` names from an MSBuild project file
pub fn parse_csproj(content: &str) -> Result<Vec<String>> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut names = Vec::new();
    let mut seen = NameSet::default();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                if e.name().as_ref().eq_ignore_ascii_case(b"PackageReference") {
                    for attr in e.attributes().flatten() {
                        if !attr.key.as_ref().eq_ignore_ascii_case(b"Include") {
                            continue;
                        }
                        let value = reader
                            .decoder()
                            .decode(&attr.value)
                            .unwrap_or_default()
                            .trim()
                            .to_string();
                        if !value.is_empty() && seen.insert(&value) {
                            names.push(value);
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ScanError::manifest(format!(
                    "XML parse error at position {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(names)
}

fn find_csproj_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_dir() {
                let hidden = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with('.') || n == "bin" || n == "obj");
                if !hidden {
                    pending.push(path);
                }
            } else if path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("csproj"))
            {
                found.push(path);
            }
        }
    }

    found.sort();
    Ok(found)
}

/// Case-insensitive set of names that keeps the first spelling seen
#[derive(Default)]
struct NameSet(HashSet<String>);

impl NameSet {
    fn insert(&mut self, name: &str) -> bool {
        self.0.insert(name.to_lowercase())
    }
}
