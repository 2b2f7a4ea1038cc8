use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use pact_api::{
    AddCommentRequest, CreatePromiseRequest, PactApi, ReframeRequest, UpdatePromiseRequest,
};
use pact_core::{FriendRequestId, NotificationId, PromiseId, UserId};
use pact_store_sqlite::SqliteStore;
use serde::Serialize;

const CLI_CONTRACT_VERSION: &str = "cli.v1";

#[derive(Debug, Parser)]
#[command(name = "pact")]
#[command(about = "Promise tracker CLI")]
struct Cli {
    #[arg(long, default_value = "./pact.sqlite3")]
    db: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Db {
        #[command(subcommand)]
        command: DbCommand,
    },
    User {
        #[command(subcommand)]
        command: UserCommand,
    },
    Promise {
        #[command(subcommand)]
        command: Box<PromiseCommand>,
    },
    Friend {
        #[command(subcommand)]
        command: FriendCommand,
    },
    Notifications {
        #[command(subcommand)]
        command: NotificationCommand,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommand {
    SchemaVersion,
    Migrate,
    IntegrityCheck,
    Backup(DbBackupArgs),
    Restore(DbRestoreArgs),
}

#[derive(Debug, Args)]
struct DbBackupArgs {
    #[arg(long)]
    out: PathBuf,
}

#[derive(Debug, Args)]
struct DbRestoreArgs {
    #[arg(long = "in")]
    input: PathBuf,
}

#[derive(Debug, Subcommand)]
enum UserCommand {
    Add(UserAddArgs),
    Show(UserShowArgs),
    Search(UserSearchArgs),
}

#[derive(Debug, Args)]
struct UserAddArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    display_name: Option<String>,
    #[arg(long)]
    email: String,
}

#[derive(Debug, Args)]
struct UserShowArgs {
    #[arg(long)]
    id: i64,
}

#[derive(Debug, Args)]
struct UserSearchArgs {
    #[arg(long)]
    user: i64,
    #[arg(long)]
    query: String,
}

#[derive(Debug, Subcommand)]
enum PromiseCommand {
    List(ActorArgs),
    Show(PromiseActionArgs),
    Create(PromiseCreateArgs),
    Complete(PromiseActionArgs),
    UndoComplete(PromiseActionArgs),
    Forfeit(PromiseActionArgs),
    Update(PromiseUpdateArgs),
    Progress(PromiseProgressArgs),
    Reframe(PromiseReframeArgs),
    Comment(PromiseCommentArgs),
    Activity(ActorArgs),
}

#[derive(Debug, Args)]
struct ActorArgs {
    #[arg(long)]
    user: i64,
}

#[derive(Debug, Args)]
struct PromiseActionArgs {
    #[arg(long)]
    user: i64,
    #[arg(long)]
    id: i64,
}

#[derive(Debug, Args)]
struct PromiseCreateArgs {
    #[arg(long)]
    user: i64,
    #[arg(long)]
    name: String,
    #[arg(long, default_value = "")]
    content: String,
    #[arg(long)]
    deadline: String,
    #[arg(long)]
    kind: Option<String>,
    #[arg(long)]
    category: Option<String>,
    #[arg(long)]
    recurrence: Option<String>,
    #[arg(long)]
    visibility: Option<String>,
    #[arg(long)]
    target_value: Option<i64>,
    #[arg(long)]
    reminder_hours: Option<i64>,
    #[arg(long = "participant")]
    participants: Vec<i64>,
}

#[derive(Debug, Args)]
struct PromiseUpdateArgs {
    #[arg(long)]
    user: i64,
    #[arg(long)]
    id: i64,
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    content: Option<String>,
    #[arg(long)]
    deadline: Option<String>,
}

#[derive(Debug, Args)]
struct PromiseProgressArgs {
    #[arg(long)]
    user: i64,
    #[arg(long)]
    id: i64,
    #[arg(long)]
    value: i64,
}

#[derive(Debug, Args)]
struct PromiseReframeArgs {
    #[arg(long)]
    user: i64,
    #[arg(long)]
    id: i64,
    #[arg(long)]
    name: String,
    #[arg(long, default_value = "")]
    content: String,
    #[arg(long)]
    deadline: String,
}

#[derive(Debug, Args)]
struct PromiseCommentArgs {
    #[arg(long)]
    user: i64,
    #[arg(long)]
    id: i64,
    #[arg(long)]
    body: String,
    #[arg(long)]
    parent: Option<i64>,
}

#[derive(Debug, Subcommand)]
enum FriendCommand {
    Request(FriendRequestArgs),
    Accept(FriendActionArgs),
    Decline(FriendActionArgs),
    Cancel(FriendActionArgs),
    List(ActorArgs),
    Remove(FriendRemoveArgs),
}

#[derive(Debug, Args)]
struct FriendRequestArgs {
    #[arg(long)]
    from: i64,
    #[arg(long)]
    to: i64,
}

#[derive(Debug, Args)]
struct FriendActionArgs {
    #[arg(long)]
    user: i64,
    #[arg(long)]
    id: i64,
}

#[derive(Debug, Args)]
struct FriendRemoveArgs {
    #[arg(long)]
    user: i64,
    #[arg(long)]
    friend: i64,
}

#[derive(Debug, Subcommand)]
enum NotificationCommand {
    List(ActorArgs),
    UnreadCount(ActorArgs),
    Read(NotificationReadArgs),
    ReadAll(ActorArgs),
}

#[derive(Debug, Args)]
struct NotificationReadArgs {
    #[arg(long)]
    user: i64,
    #[arg(long)]
    id: i64,
}

#[derive(Debug, Serialize)]
struct CliEnvelope<T>
where
    T: Serialize,
{
    cli_contract_version: &'static str,
    data: T,
}

fn print_envelope<T>(data: T) -> Result<()>
where
    T: Serialize,
{
    let envelope = CliEnvelope { cli_contract_version: CLI_CONTRACT_VERSION, data };
    println!("{}", serde_json::to_string_pretty(&envelope)?);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let api = PactApi::new(cli.db.clone());

    match cli.command {
        Command::Db { command } => run_db(&cli.db, &command),
        Command::User { command } => run_user(&api, &command),
        Command::Promise { command } => run_promise(&api, &command),
        Command::Friend { command } => run_friend(&api, &command),
        Command::Notifications { command } => run_notifications(&api, &command),
    }
}

fn run_db(db_path: &Path, command: &DbCommand) -> Result<()> {
    match command {
        DbCommand::SchemaVersion => {
            let store = SqliteStore::open(db_path)?;
            print_envelope(store.schema_status()?)
        }
        DbCommand::Migrate => {
            let mut store = SqliteStore::open(db_path)?;
            store.migrate()?;
            print_envelope(store.schema_status()?)
        }
        DbCommand::IntegrityCheck => {
            let mut store = SqliteStore::open(db_path)?;
            store.migrate()?;
            print_envelope(store.integrity_check()?)
        }
        DbCommand::Backup(args) => {
            let mut store = SqliteStore::open(db_path)?;
            store.migrate()?;
            store.backup_database(&args.out)?;
            print_envelope(serde_json::json!({ "backed_up_to": args.out }))
        }
        DbCommand::Restore(args) => {
            let mut store = SqliteStore::open(db_path)?;
            store.restore_database(&args.input)?;
            print_envelope(serde_json::json!({ "restored_from": args.input }))
        }
    }
}

fn run_user(api: &PactApi, command: &UserCommand) -> Result<()> {
    match command {
        UserCommand::Add(args) => {
            let user = api.register_user(&args.name, args.display_name.as_deref(), &args.email)?;
            print_envelope(user)
        }
        UserCommand::Show(args) => print_envelope(api.get_user(UserId(args.id))?),
        UserCommand::Search(args) => {
            print_envelope(api.search_users(&args.query, UserId(args.user))?)
        }
    }
}

fn run_promise(api: &PactApi, command: &PromiseCommand) -> Result<()> {
    match command {
        PromiseCommand::List(args) => print_envelope(api.dashboard(UserId(args.user))?),
        PromiseCommand::Show(args) => {
            print_envelope(api.promise_detail(PromiseId(args.id), UserId(args.user))?)
        }
        PromiseCommand::Create(args) => {
            let request = CreatePromiseRequest {
                name: args.name.clone(),
                kind: args.kind.clone(),
                content: args.content.clone(),
                deadline: args.deadline.clone(),
                category: args.category.clone(),
                recurrence: args.recurrence.clone(),
                visibility: args.visibility.clone(),
                target_value: args.target_value,
                current_value: None,
                reminder_value: None,
                reminder_unit: None,
                reminder_hours: args.reminder_hours,
                participant_user_ids: args.participants.clone(),
            };
            let id = api.create_promise(UserId(args.user), &request)?;
            print_envelope(serde_json::json!({ "id": id }))
        }
        PromiseCommand::Complete(args) => {
            print_envelope(api.complete(PromiseId(args.id), UserId(args.user))?)
        }
        PromiseCommand::UndoComplete(args) => {
            print_envelope(api.undo_complete(PromiseId(args.id), UserId(args.user))?)
        }
        PromiseCommand::Forfeit(args) => {
            print_envelope(api.forfeit(PromiseId(args.id), UserId(args.user))?)
        }
        PromiseCommand::Update(args) => {
            let request = UpdatePromiseRequest {
                name: args.name.clone(),
                content: args.content.clone(),
                deadline: args.deadline.clone(),
            };
            api.update_promise(PromiseId(args.id), UserId(args.user), &request)?;
            print_envelope(serde_json::json!({ "id": args.id, "status": "updated" }))
        }
        PromiseCommand::Progress(args) => {
            print_envelope(api.update_progress(PromiseId(args.id), UserId(args.user), args.value)?)
        }
        PromiseCommand::Reframe(args) => {
            let request = ReframeRequest {
                name: args.name.clone(),
                content: args.content.clone(),
                deadline: args.deadline.clone(),
            };
            let id = api.apply_reframe(PromiseId(args.id), UserId(args.user), &request)?;
            print_envelope(serde_json::json!({ "id": id, "status": "reframed" }))
        }
        PromiseCommand::Comment(args) => {
            let request = AddCommentRequest {
                body: args.body.clone(),
                parent_comment_id: args.parent,
            };
            print_envelope(api.add_comment(PromiseId(args.id), UserId(args.user), &request)?)
        }
        PromiseCommand::Activity(args) => {
            print_envelope(api.activity(UserId(args.user), None)?)
        }
    }
}

fn run_friend(api: &PactApi, command: &FriendCommand) -> Result<()> {
    match command {
        FriendCommand::Request(args) => {
            print_envelope(api.send_friend_request(UserId(args.from), UserId(args.to))?)
        }
        FriendCommand::Accept(args) => {
            api.accept_friend_request(FriendRequestId(args.id), UserId(args.user))?;
            print_envelope(serde_json::json!({ "ok": true }))
        }
        FriendCommand::Decline(args) => {
            api.decline_friend_request(FriendRequestId(args.id), UserId(args.user))?;
            print_envelope(serde_json::json!({ "ok": true }))
        }
        FriendCommand::Cancel(args) => {
            api.cancel_friend_request(FriendRequestId(args.id), UserId(args.user))?;
            print_envelope(serde_json::json!({ "ok": true }))
        }
        FriendCommand::List(args) => print_envelope(api.list_friends(UserId(args.user))?),
        FriendCommand::Remove(args) => {
            api.remove_friend(UserId(args.user), UserId(args.friend))?;
            print_envelope(serde_json::json!({ "ok": true }))
        }
    }
}

fn run_notifications(api: &PactApi, command: &NotificationCommand) -> Result<()> {
    match command {
        NotificationCommand::List(args) => {
            print_envelope(api.notifications(UserId(args.user), None)?)
        }
        NotificationCommand::UnreadCount(args) => {
            print_envelope(serde_json::json!({ "count": api.unread_count(UserId(args.user))? }))
        }
        NotificationCommand::Read(args) => {
            api.mark_notification_read(NotificationId(args.id), UserId(args.user))?;
            print_envelope(serde_json::json!({ "ok": true }))
        }
        NotificationCommand::ReadAll(args) => {
            api.mark_all_notifications_read(UserId(args.user))?;
            print_envelope(serde_json::json!({ "ok": true }))
        }
    }
}
