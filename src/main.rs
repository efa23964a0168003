// PromptChain — Replay stored prompt workflows into a chat surface
// License: Apache-2.0

use clap::{Parser, Subcommand};
use promptchain::bus::{BusService, MessageBus};
use promptchain::config::Config;
use promptchain::engine::{Dispatcher, ExecutionStatus, StepRunner};
use promptchain::surface::chat::{ChatPages, ChatSurface};
use promptchain::workflow::store::{JsonFileStore, WorkflowStore};
use promptchain::workflow::variables::{self, VariableValues};
use promptchain::workflow::{NodePatch, VariablePatch, Workflow};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const LOGO: &str = "⛓️";

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(
    name = "promptchain",
    about = "PromptChain — replay stored prompt workflows into a chat, step by step",
    version
)]
struct Cli {
    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List stored workflows
    List,
    /// Print one workflow as JSON
    Show { id: String },
    /// Create a workflow from prompts given on the command line
    New {
        name: String,
        #[arg(short, long, default_value = "")]
        description: String,
        /// One prompt step; repeat for more steps
        #[arg(short, long = "prompt")]
        prompts: Vec<String>,
    },
    /// Store a workflow from a JSON or YAML file (replaces one with the same id)
    Import { file: PathBuf },
    /// Delete a workflow
    Delete { id: String },
    /// Append a prompt step to a workflow
    AddStep {
        id: String,
        prompt: String,
        #[arg(short, long)]
        label: Option<String>,
    },
    /// Change the label or prompt of a step
    EditStep {
        id: String,
        node: String,
        #[arg(short, long)]
        label: Option<String>,
        #[arg(short, long)]
        prompt: Option<String>,
    },
    /// Remove a step by node id
    RemoveStep { id: String, node: String },
    /// Define a variable, or change its default value and description
    SetVar {
        id: String,
        name: String,
        #[arg(long = "default")]
        value: Option<String>,
        #[arg(short, long)]
        description: Option<String>,
    },
    /// Remove a variable definition
    RemoveVar { id: String, name: String },
    /// Show the variables a workflow needs and their defaults
    Vars { id: String },
    /// Check every prompt against the workflow's variable definitions
    Validate { id: String },
    /// Execute a workflow against the configured chat endpoint
    Run {
        id: String,
        /// Variable value as name=value; repeat for more
        #[arg(short, long = "var", value_parser = parse_var)]
        vars: Vec<(String, String)>,
    },
}

fn parse_var(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected name=value, got '{}'", s)),
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() {
    promptchain::logger::init();

    let cli = Cli::parse();
    let cfg = load_config(cli.config.as_deref());

    if let Err(e) = cfg.validate() {
        eprintln!("{} Configuration Error: {}", LOGO, e);
        std::process::exit(1);
    }

    let app = match App::build(&cfg) {
        Ok(app) => app,
        Err(e) => {
            eprintln!("{} Error: {:#}", LOGO, e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::List => app.list().await,
        Commands::Show { id } => app.show(&id).await,
        Commands::New {
            name,
            description,
            prompts,
        } => app.create(name, description, prompts).await,
        Commands::Import { file } => app.import(&file).await,
        Commands::Delete { id } => app.delete(&id).await,
        Commands::AddStep { id, prompt, label } => app.add_step(&id, prompt, label).await,
        Commands::EditStep {
            id,
            node,
            label,
            prompt,
        } => app.edit_step(&id, &node, NodePatch { label, prompt }).await,
        Commands::RemoveStep { id, node } => app.remove_step(&id, &node).await,
        Commands::SetVar {
            id,
            name,
            value,
            description,
        } => app.set_var(&id, &name, VariablePatch { value, description }).await,
        Commands::RemoveVar { id, name } => app.remove_var(&id, &name).await,
        Commands::Vars { id } => app.vars(&id).await,
        Commands::Validate { id } => app.validate(&id).await,
        Commands::Run { id, vars } => app.run(&id, vars).await,
    };

    if let Err(e) = result {
        eprintln!("{} Error: {:#}", LOGO, e);
        std::process::exit(1);
    }
}

fn load_config(path: Option<&str>) -> Config {
    let path = match path {
        Some(p) => PathBuf::from(p),
        None => Config::default_path().unwrap_or_else(|_| PathBuf::from("config.json")),
    };
    match Config::load(&path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{} Failed to load config from {}: {}", LOGO, path.display(), e);
            std::process::exit(1);
        }
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

struct App {
    bus: MessageBus,
    chat: Arc<ChatSurface>,
}

impl App {
    fn build(cfg: &Config) -> anyhow::Result<Self> {
        let store_path = cfg.store_path()?;
        tracing::debug!(path = %store_path.display(), "Opening workflow store");
        let store = WorkflowStore::new(Arc::new(JsonFileStore::new(store_path)));

        let chat = Arc::new(ChatSurface::new(
            cfg.chat.api_key.clone(),
            cfg.chat.api_base.clone(),
            cfg.chat.model.clone(),
            Duration::from_secs(cfg.chat.request_timeout_secs),
        )?);
        let pages = Arc::new(ChatPages::new(cfg.chat.page_url.clone(), chat.clone()));

        let runner = StepRunner::new(cfg.locator(), cfg.timing());
        let dispatcher = Dispatcher::new(store.clone(), pages, cfg.url_patterns()?, runner);

        let (bus, _service) = MessageBus::spawn(BusService::new(store, dispatcher));
        Ok(Self { bus, chat })
    }

    async fn find(&self, id: &str) -> anyhow::Result<Workflow> {
        self.bus
            .load_workflows()
            .await?
            .into_iter()
            .find(|w| w.id == id)
            .ok_or_else(|| anyhow::anyhow!("workflow '{}' not found", id))
    }

    async fn save(&self, workflow: Workflow) -> anyhow::Result<()> {
        let id = workflow.id.clone();
        if !self.bus.save_workflow(workflow).await? {
            anyhow::bail!("failed to save workflow '{}'", id);
        }
        Ok(())
    }

    async fn list(&self) -> anyhow::Result<()> {
        let workflows = self.bus.load_workflows().await?;
        if workflows.is_empty() {
            println!("No workflows yet. Create one with `promptchain new` or `promptchain import`.");
            return Ok(());
        }
        for wf in workflows {
            println!(
                "{}  {}  ({} steps, updated {})",
                wf.id,
                wf.name,
                wf.prompt_nodes().count(),
                wf.updated_at.format("%Y-%m-%d %H:%M")
            );
            if !wf.description.is_empty() {
                println!("    {}", wf.description);
            }
        }
        Ok(())
    }

    async fn show(&self, id: &str) -> anyhow::Result<()> {
        let wf = self.find(id).await?;
        println!("{}", serde_json::to_string_pretty(&wf)?);
        Ok(())
    }

    async fn create(
        &self,
        name: String,
        description: String,
        prompts: Vec<String>,
    ) -> anyhow::Result<()> {
        let mut wf = Workflow::new(name, description);
        for prompt in prompts {
            let node_id = wf.add_prompt_node();
            wf.update_node(
                &node_id,
                NodePatch {
                    prompt: Some(prompt),
                    ..Default::default()
                },
            );
        }
        define_placeholders(&mut wf);

        let id = wf.id.clone();
        self.save(wf).await?;
        println!("{} Created workflow {}", LOGO, id);
        Ok(())
    }

    async fn import(&self, file: &Path) -> anyhow::Result<()> {
        let content = std::fs::read_to_string(file)?;
        let is_yaml = matches!(
            file.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        let mut wf: Workflow = if is_yaml {
            serde_yaml::from_str(&content)?
        } else {
            serde_json::from_str(&content)?
        };
        // Edges are never interpreted and are not kept
        wf.edges.clear();

        let id = wf.id.clone();
        self.save(wf).await?;
        println!("{} Imported workflow {}", LOGO, id);
        Ok(())
    }

    async fn delete(&self, id: &str) -> anyhow::Result<()> {
        if !self.bus.delete_workflow(id).await? {
            anyhow::bail!("failed to delete workflow '{}'", id);
        }
        println!("{} Deleted workflow {}", LOGO, id);
        Ok(())
    }

    async fn add_step(
        &self,
        id: &str,
        prompt: String,
        label: Option<String>,
    ) -> anyhow::Result<()> {
        let mut wf = self.find(id).await?;
        let node_id = wf.add_prompt_node();
        wf.update_node(
            &node_id,
            NodePatch {
                label,
                prompt: Some(prompt),
            },
        );
        define_placeholders(&mut wf);
        self.save(wf).await?;
        println!("{} Added step {} to workflow {}", LOGO, node_id, id);
        Ok(())
    }

    async fn edit_step(&self, id: &str, node: &str, patch: NodePatch) -> anyhow::Result<()> {
        let mut wf = self.find(id).await?;
        if !wf.update_node(node, patch) {
            anyhow::bail!("workflow '{}' has no step '{}'", id, node);
        }
        define_placeholders(&mut wf);
        self.save(wf).await?;
        println!("{} Updated step {}", LOGO, node);
        Ok(())
    }

    async fn remove_step(&self, id: &str, node: &str) -> anyhow::Result<()> {
        let mut wf = self.find(id).await?;
        if !wf.remove_node(node) {
            anyhow::bail!("workflow '{}' has no step '{}'", id, node);
        }
        self.save(wf).await?;
        println!("{} Removed step {}", LOGO, node);
        Ok(())
    }

    async fn set_var(&self, id: &str, name: &str, patch: VariablePatch) -> anyhow::Result<()> {
        let name = name.trim();
        let mut wf = self.find(id).await?;
        wf.add_variable(name);
        if !wf.update_variable(name, patch) {
            anyhow::bail!("invalid variable name '{}'", name);
        }
        self.save(wf).await?;
        println!("{} Set variable {{{}}}", LOGO, name);
        Ok(())
    }

    async fn remove_var(&self, id: &str, name: &str) -> anyhow::Result<()> {
        let mut wf = self.find(id).await?;
        if !wf.remove_variable(name) {
            anyhow::bail!("workflow '{}' has no variable '{}'", id, name);
        }
        self.save(wf).await?;
        println!("{} Removed variable {{{}}}", LOGO, name);
        Ok(())
    }

    async fn vars(&self, id: &str) -> anyhow::Result<()> {
        let wf = self.find(id).await?;
        let required = variables::required_variables(&wf);
        if required.is_empty() {
            println!("This workflow has no variables. Ready to execute!");
            return Ok(());
        }
        let initial = variables::initial_values(&wf);
        for name in &required {
            let default = initial.get(name).map(String::as_str).unwrap_or_default();
            print!("{{{}}}  default: {:?}", name, default);
            if let Some(desc) = wf.variable(name).and_then(|v| v.description.as_deref()) {
                print!("  ({})", desc);
            }
            println!();
        }
        Ok(())
    }

    async fn validate(&self, id: &str) -> anyhow::Result<()> {
        let wf = self.find(id).await?;
        let mut all_valid = true;
        for (index, (node, prompt)) in wf.prompt_nodes().enumerate() {
            let report = variables::validate(prompt, &wf.variable_definitions);
            let mark = if report.is_valid { "✅" } else { "❌" };
            println!("{} Step {}: {}", mark, index + 1, node.data.label);
            if !report.missing.is_empty() {
                println!("    missing: {}", report.missing.join(", "));
            }
            if !report.unused.is_empty() {
                println!("    unused:  {}", report.unused.join(", "));
            }
            all_valid &= report.is_valid;
        }
        if !all_valid {
            anyhow::bail!("workflow '{}' references undefined variables", id);
        }
        Ok(())
    }

    async fn run(&self, id: &str, overrides: Vec<(String, String)>) -> anyhow::Result<()> {
        let wf = self.find(id).await?;
        let required = variables::required_variables(&wf);

        let mut values: VariableValues = variables::initial_values(&wf);
        values.extend(overrides);

        if !variables::is_ready(&required, &values) {
            let blank: Vec<&str> = required
                .iter()
                .filter(|name| values.get(*name).map_or(true, |v| v.trim().is_empty()))
                .map(String::as_str)
                .collect();
            anyhow::bail!(
                "please fill in all variable values before executing (missing: {})",
                blank.join(", ")
            );
        }

        println!("{} Executing: {}", LOGO, wf.name);
        let record = self
            .bus
            .execute_workflow(id, serde_json::to_value(&values)?)
            .await?;

        for message in self.chat.transcript().await {
            println!("\n[{}]\n{}", message.role, message.content);
        }
        println!("\n{}", serde_json::to_string_pretty(&record)?);

        if record.status == ExecutionStatus::Failed {
            std::process::exit(1);
        }
        Ok(())
    }
}

/// Define every placeholder the prompts use that has no definition yet.
fn define_placeholders(wf: &mut Workflow) {
    for name in variables::required_variables(wf) {
        wf.add_variable(&name);
    }
}
