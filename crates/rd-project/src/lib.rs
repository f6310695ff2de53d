//! rd-project: model definition documents, their validation, and construction.

pub mod build;
pub mod schema;
pub mod validate;

pub use build::build_model;
pub use schema::*;
pub use validate::{ValidationError, validate_model_def};

/// Current document version. Older documents load unchanged.
pub const LATEST_VERSION: u32 = 1;

pub type ProjectResult<T> = Result<T, ProjectError>;

#[derive(thiserror::Error, Debug)]
pub enum ProjectError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Component error: {0}")]
    Component(#[from] rd_components::ComponentError),

    #[error("Model error: {0}")]
    Model(#[from] rd_model::ModelError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub fn from_yaml_str(content: &str) -> ProjectResult<ModelDef> {
    let def: ModelDef = serde_yaml::from_str(content)?;
    validate_model_def(&def)?;
    Ok(def)
}

pub fn load_yaml(path: &std::path::Path) -> ProjectResult<ModelDef> {
    let content = std::fs::read_to_string(path)?;
    from_yaml_str(&content)
}

pub fn save_yaml(path: &std::path::Path, def: &ModelDef) -> ProjectResult<()> {
    validate_model_def(def)?;
    let content = serde_yaml::to_string(def)?;
    std::fs::write(path, content)?;
    Ok(())
}

pub fn load_json(path: &std::path::Path) -> ProjectResult<ModelDef> {
    let content = std::fs::read_to_string(path)?;
    let def: ModelDef = serde_json::from_str(&content)?;
    validate_model_def(&def)?;
    Ok(def)
}

pub fn save_json(path: &std::path::Path, def: &ModelDef) -> ProjectResult<()> {
    validate_model_def(def)?;
    let content = serde_json::to_string_pretty(def)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Load by extension: `.json` is JSON, anything else YAML.
pub fn load(path: &std::path::Path) -> ProjectResult<ModelDef> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => load_json(path),
        _ => load_yaml(path),
    }
}
