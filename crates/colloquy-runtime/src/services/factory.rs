use std::fmt;
use std::sync::Arc;

use camino::Utf8PathBuf;

use super::{
    CONTENT_DATA_ROOT, CONTENT_VIEWS_ROOT, DATA_MOUNT, LanguageGenerationBuilder,
    SharedCollaborators, ServiceTemplate, VIEWS_MOUNT,
};
use crate::error::PluginError;
use crate::fs::{MountedFileSystem, PluginFileSystem, ScopedFileSystem};
use crate::strong_name::PluginStrongName;

/// Builds the service template for a plugin on first load.
#[cfg_attr(test, mockall::automock)]
pub trait ServiceContextFactory: Send + Sync {
    /// Builds the template for `strong_name`.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::ServiceContext`] when a collaborator cannot be
    /// prepared for the plugin.
    fn build_template(&self, strong_name: &PluginStrongName)
    -> Result<ServiceTemplate, PluginError>;
}

/// Factory that scopes a shared content tree to each plugin.
///
/// For a plugin `weather 1.0` the plugin sees `views/` backed by
/// `views/weather 1.0/` and `data/` backed by `plugindata/weather 1.0/` of
/// the content tree. Nothing else in the tree is reachable.
pub struct DefaultServiceContextFactory {
    content: Arc<dyn PluginFileSystem>,
    language_generation: Option<Arc<dyn LanguageGenerationBuilder>>,
    collaborators: SharedCollaborators,
}

impl DefaultServiceContextFactory {
    /// Creates a factory over `content` with no collaborators.
    #[must_use]
    pub fn new(content: Arc<dyn PluginFileSystem>) -> Self {
        Self {
            content,
            language_generation: None,
            collaborators: SharedCollaborators::default(),
        }
    }

    /// Builds a language-generation engine for every plugin.
    #[must_use]
    pub fn with_language_generation(mut self, builder: Arc<dyn LanguageGenerationBuilder>) -> Self {
        self.language_generation = Some(builder);
        self
    }

    /// Shares `collaborators` with every plugin.
    #[must_use]
    pub fn with_collaborators(mut self, collaborators: SharedCollaborators) -> Self {
        self.collaborators = collaborators;
        self
    }

    fn plugin_file_system(
        &self,
        strong_name: &PluginStrongName,
    ) -> Result<MountedFileSystem, PluginError> {
        let directory = strong_name.to_string();
        let scope = |root: &str| -> Result<Arc<dyn PluginFileSystem>, PluginError> {
            let prefix = Utf8PathBuf::from(root).join(&directory);
            ScopedFileSystem::new(Arc::clone(&self.content), prefix)
                .map(|fs| Arc::new(fs) as Arc<dyn PluginFileSystem>)
                .map_err(|error| PluginError::ServiceContext {
                    strong_name: strong_name.clone(),
                    message: error.to_string(),
                })
        };
        let views = scope(CONTENT_VIEWS_ROOT)?;
        let data = scope(CONTENT_DATA_ROOT)?;
        MountedFileSystem::new()
            .mount(VIEWS_MOUNT, views)
            .and_then(|fs| fs.mount(DATA_MOUNT, data))
            .map_err(|error| PluginError::ServiceContext {
                strong_name: strong_name.clone(),
                message: error.to_string(),
            })
    }
}

impl fmt::Debug for DefaultServiceContextFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultServiceContextFactory")
            .field("language_generation", &self.language_generation.is_some())
            .field("collaborators", &self.collaborators)
            .finish_non_exhaustive()
    }
}

impl ServiceContextFactory for DefaultServiceContextFactory {
    fn build_template(
        &self,
        strong_name: &PluginStrongName,
    ) -> Result<ServiceTemplate, PluginError> {
        let file_system: Arc<dyn PluginFileSystem> =
            Arc::new(self.plugin_file_system(strong_name)?);
        let mut template = ServiceTemplate::new(strong_name.clone(), Arc::clone(&file_system))
            .with_collaborators(self.collaborators.clone());
        if let Some(builder) = &self.language_generation {
            let generator = builder.build(strong_name, file_system).map_err(|error| {
                PluginError::ServiceContext {
                    strong_name: strong_name.clone(),
                    message: error.to_string(),
                }
            })?;
            template = template.with_language_generator(generator);
        }
        Ok(template)
    }
}
