//! cpstore: operator CLI for the resource store and work queue.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use controlplane_store::cancel::with_cancel_and_timeout;
use controlplane_store::config::Config;
use controlplane_store::error::Error;
use controlplane_store::model::{NewMessage, Object, Query};
use controlplane_store::provider::Backends;
use controlplane_store::queue::DequeueOptions;
use controlplane_store::resources::ResourceId;
use controlplane_store::store::{DeleteOptions, SaveOptions};
use controlplane_store::telemetry::init_telemetry;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "cpstore", about = "Resource store and work queue for the control plane")]
struct Cli {
    /// TOML configuration file. Environment variables are used when absent.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Deadline for each store or queue call, in seconds
    #[arg(long, global = true, default_value_t = 30)]
    timeout: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply database migrations
    Migrate,
    /// Resource store operations
    Resource {
        #[command(subcommand)]
        action: ResourceAction,
    },
    /// Queue operations
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },
}

#[derive(Subcommand)]
enum ResourceAction {
    /// Print a stored object as JSON
    Get { id: String },
    /// Store JSON data at an id
    Put {
        id: String,
        /// JSON document
        data: String,
        /// Only write if the stored etag matches
        #[arg(long)]
        if_match: Option<String>,
        #[arg(long, default_value = "")]
        api_version: String,
    },
    /// Delete a stored object
    Delete {
        id: String,
        #[arg(long)]
        if_match: Option<String>,
    },
    /// List objects under a scope
    List {
        /// Root scope, e.g. /planes/radius/local/resourceGroups/rg
        root_scope: String,
        /// Include descendant scopes
        #[arg(long)]
        recursive: bool,
        /// List scopes instead of resources
        #[arg(long)]
        scopes: bool,
        #[arg(long = "type")]
        resource_type: Option<String>,
        #[arg(long)]
        routing_prefix: Option<String>,
        /// field=value equality filters on the data
        #[arg(long = "filter")]
        filters: Vec<String>,
    },
}

#[derive(Subcommand)]
enum QueueAction {
    /// Enqueue a JSON message
    Send { data: String },
    /// Lease one message and print it
    Receive {
        /// Lease duration in seconds
        #[arg(long)]
        lease_secs: Option<u64>,
    },
    /// Finish a message by id and dequeue count
    Finish { id: String, dequeue_count: u32 },
    /// Dequeue and finish everything currently visible
    Drain,
}

/// Backends plus the deadline and Ctrl-C token every call runs under.
struct Ctx {
    backends: Backends,
    cancel: CancellationToken,
    timeout: Duration,
}

impl Ctx {
    async fn call<T>(
        &self,
        op: impl Future<Output = controlplane_store::Result<T>>,
    ) -> controlplane_store::Result<T> {
        with_cancel_and_timeout(&self.cancel, self.timeout, op).await
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    let _guard = init_telemetry(config.telemetry_config())?;

    let backends = Backends::connect(&config).await?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let ctx = Ctx {
        backends,
        cancel,
        timeout: Duration::from_secs(cli.timeout),
    };

    match cli.command {
        Command::Migrate => cmd_migrate(&ctx).await,
        Command::Resource { action } => {
            if let Some(db) = &ctx.backends.db {
                db.migrate().await?;
            }
            cmd_resource(&ctx, action).await
        }
        Command::Queue { action } => {
            if let Some(db) = &ctx.backends.db {
                db.migrate().await?;
            }
            cmd_queue(&ctx, action).await
        }
    }
}

async fn cmd_migrate(ctx: &Ctx) -> anyhow::Result<()> {
    let db = ctx
        .backends
        .db
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("no postgres backend configured"))?;
    db.migrate().await?;
    ctx.call(db.health_check()).await?;
    println!("Migrations applied.");
    Ok(())
}

async fn cmd_resource(ctx: &Ctx, action: ResourceAction) -> anyhow::Result<()> {
    let storage = &ctx.backends.storage;

    match action {
        ResourceAction::Get { id } => {
            let id = ResourceId::parse(&id)?;
            let object = ctx.call(storage.get(&id)).await?;
            println!("{}", serde_json::to_string_pretty(&object)?);
        }
        ResourceAction::Put {
            id,
            data,
            if_match,
            api_version,
        } => {
            let id = ResourceId::parse(&id)?;
            let data: serde_json::Value = serde_json::from_str(&data)?;
            let object = Object::new(id, data).with_api_version(api_version);
            let options = SaveOptions { etag: if_match };
            match ctx.call(storage.save(object, &options)).await {
                Ok(saved) => println!("Saved: {} (etag: {})", saved.id(), saved.etag().unwrap_or("-")),
                Err(Error::ConcurrencyConflict) => anyhow::bail!("etag mismatch; re-read and retry"),
                Err(e) => return Err(e.into()),
            }
        }
        ResourceAction::Delete { id, if_match } => {
            let id = ResourceId::parse(&id)?;
            let options = DeleteOptions { etag: if_match };
            ctx.call(storage.delete(&id, &options)).await?;
            println!("Deleted: {id}");
        }
        ResourceAction::List {
            root_scope,
            recursive,
            scopes,
            resource_type,
            routing_prefix,
            filters,
        } => {
            let root = ResourceId::parse(&root_scope)?;
            let mut query = if scopes {
                Query::scopes(root)
            } else {
                Query::resources(root)
            };
            if recursive {
                query = query.recursive();
            }
            if let Some(t) = resource_type {
                query = query.resource_type(t);
            }
            if let Some(p) = routing_prefix {
                query = query.routing_scope_prefix(p);
            }
            for filter in filters {
                let (field, value) = filter
                    .split_once('=')
                    .ok_or_else(|| anyhow::anyhow!("filter must be field=value: {filter}"))?;
                query = query.filter(field, value);
            }

            let mut items = ctx.call(storage.query(&query)).await?;
            if items.is_empty() {
                println!("No objects found.");
                return Ok(());
            }

            items.sort_by(|a, b| a.id().as_str().cmp(b.id().as_str()));
            println!("{:<64}  {:<40}  ETAG", "ID", "TYPE");
            println!("{}", "-".repeat(120));
            for item in &items {
                let etag = item.etag().unwrap_or("-");
                println!(
                    "{:<64}  {:<40}  {}",
                    item.id(),
                    item.id().resource_type(),
                    &etag[..etag.len().min(12)]
                );
            }
            println!("\n{} object(s)", items.len());
        }
    }
    Ok(())
}

async fn cmd_queue(ctx: &Ctx, action: QueueAction) -> anyhow::Result<()> {
    let queue = &ctx.backends.queue;

    match action {
        QueueAction::Send { data } => {
            let value: serde_json::Value = serde_json::from_str(&data)?;
            let id = ctx.call(queue.enqueue(NewMessage::json(&value)?)).await?;
            println!("Enqueued: {id}");
        }
        QueueAction::Receive { lease_secs } => {
            let options = DequeueOptions {
                lease_duration: lease_secs.map(Duration::from_secs),
            };
            match ctx.call(queue.dequeue(&options)).await {
                Ok(message) => {
                    println!("ID:            {}", message.id);
                    println!("Dequeue count: {}", message.dequeue_count);
                    println!("Visible at:    {}", message.next_visible_at.to_rfc3339());
                    println!("Data:          {}", String::from_utf8_lossy(&message.data));
                }
                Err(Error::MessageNotFound) => println!("No visible messages."),
                Err(e) => return Err(e.into()),
            }
        }
        QueueAction::Finish { id, dequeue_count } => {
            // Only the id and lease generation identify the lease.
            let handle = controlplane_store::model::Message {
                id,
                dequeue_count,
                enqueued_at: chrono::Utc::now(),
                next_visible_at: chrono::Utc::now(),
                content_type: String::new(),
                data: Vec::new(),
            };
            ctx.call(queue.finish_message(&handle)).await?;
            println!("Finished: {}", handle.id);
        }
        QueueAction::Drain => {
            let mut drained = 0usize;
            loop {
                match ctx.call(queue.dequeue(&DequeueOptions::default())).await {
                    Ok(message) => {
                        ctx.call(queue.finish_message(&message)).await?;
                        drained += 1;
                    }
                    Err(Error::MessageNotFound) => break,
                    Err(e) => return Err(e.into()),
                }
            }
            println!("Drained {drained} message(s).");
        }
    }
    Ok(())
}
