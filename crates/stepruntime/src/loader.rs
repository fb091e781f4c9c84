use stepcore::{EngineError, WorkflowSpec};
use std::path::Path;

/// Read one workflow spec from a JSON file
pub fn load_workflow_file(path: impl AsRef<Path>) -> Result<WorkflowSpec, EngineError> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)?;
    let spec: WorkflowSpec = serde_json::from_reader(std::io::BufReader::new(file))?;
    tracing::debug!("Loaded workflow '{}' from {}", spec.name, path.display());
    Ok(spec)
}

/// Read every `*.json` workflow spec in a directory, sorted by file name
pub fn load_workflow_dir(dir: impl AsRef<Path>) -> Result<Vec<WorkflowSpec>, EngineError> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension() == Some("json".as_ref()) {
            paths.push(path);
        }
    }
    paths.sort();

    paths.iter().map(load_workflow_file).collect()
}
