//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::{CommonArgs, PredictArgs, ServeArgs};
use crate::config::{ServiceConfig, ServiceConfigBuilder};
use anyhow::{Context, Result};

/// Merge the optional config file with command-line flags
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Configuration for `serve`; flags win over the file
    pub(crate) fn from_serve_args(args: &ServeArgs) -> Result<ServiceConfig> {
        let mut builder = Self::base(&args.common)?;

        if let Some(host) = &args.host {
            builder = builder.host(host.clone());
        }
        if let Some(port) = args.port {
            builder = builder.port(port);
        }
        if let Some(bytes) = args.max_upload_bytes {
            builder = builder.max_upload_bytes(bytes);
        }
        if let Some(limit) = args.max_concurrent_requests {
            builder = builder.max_concurrent_requests(limit);
        }
        if let Some(secs) = args.request_timeout_secs {
            builder = builder.request_timeout_secs(secs);
        }

        builder.build().context("Invalid server settings")
    }

    /// Configuration for `predict`
    pub(crate) fn from_predict_args(args: &PredictArgs) -> Result<ServiceConfig> {
        Self::base(&args.common)?
            .build()
            .context("Invalid prediction settings")
    }

    fn base(common: &CommonArgs) -> Result<ServiceConfigBuilder> {
        let config = match &common.config {
            Some(path) => ServiceConfig::from_file(path)
                .with_context(|| format!("Failed to load config file {}", path.display()))?,
            None => ServiceConfig::default(),
        };

        let mut builder = ServiceConfigBuilder::from_config(config);
        if let Some(model) = &common.model {
            builder = builder.model_dir(model.clone());
        }
        Ok(builder)
    }
}
