//! Actions declared in configuration whose controllers render a template.

use std::sync::Arc;

use anyhow::{Context, Result};
use minijinja::{Environment, context};

use crate::controller::{Continuation, Controller, Reply};
use crate::core::registry::{ActionSpec, Actions};
use crate::core::task::Params;
use crate::io::config::FulfillConfig;

/// Renders one minijinja template per matched tag.
///
/// Available variables: `content`, `tag`, `before`, `after`, `all`, `index`,
/// `attributes` and `context` (a snapshot taken when the task runs).
pub struct TemplateController {
    env: Arc<Environment<'static>>,
    name: String,
    source: String,
}

impl TemplateController {
    pub fn new(name: &str, source: &str) -> Result<Self> {
        Self::shared(Arc::new(Environment::new()), name, source)
    }

    fn shared(env: Arc<Environment<'static>>, name: &str, source: &str) -> Result<Self> {
        check_template(source).with_context(|| format!("compile template for <{name}>"))?;
        Ok(Self {
            env,
            name: name.to_string(),
            source: source.to_string(),
        })
    }

    pub fn render(&self, params: &Params) -> Result<String> {
        let rendered = self
            .env
            .render_str(
                &self.source,
                context! {
                    content => params.content(),
                    tag => params.tag(),
                    before => params.before(),
                    after => params.after(),
                    all => params.all(),
                    index => params.index(),
                    attributes => params.attributes(),
                    context => params.context().snapshot(),
                },
            )
            .with_context(|| format!("render template for <{}>", self.name))?;
        Ok(rendered)
    }
}

impl Controller for TemplateController {
    fn call(&self, params: Params, _next: Continuation) -> Result<Reply> {
        self.render(&params).map(Reply::Value)
    }
}

/// Check that `source` compiles as a minijinja template.
pub fn check_template(source: &str) -> Result<()> {
    let env = Environment::new();
    env.template_from_str(source)?;
    Ok(())
}

/// Build the action registry described by `cfg`.
pub fn actions_from_config(cfg: &FulfillConfig) -> Result<Actions> {
    let env = Arc::new(Environment::new());
    let mut actions = Actions::new();
    for (name, action) in &cfg.actions {
        let controller = TemplateController::shared(Arc::clone(&env), name, &action.template)?;
        let spec = ActionSpec::new(controller)
            .replace(action.replace.into())
            .in_series(action.series);
        actions.insert(name.clone(), spec);
    }
    Ok(actions)
}
