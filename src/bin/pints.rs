use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use structopt::StructOpt;
use tracing::info;

use pints::{
    blob::FileBlobStore,
    config::{init_tracing, GlobalOptions},
    entry::EntryRef,
    member::{Member, MemberId, Pair},
    mutation::Change,
    session::Session,
    store::{JsonFileStore, Store},
    utils::{short_datetime, SystemClock},
};

#[derive(StructOpt)]
#[structopt(name = "pints", about = "Record who owes who a pint")]
pub struct Options {
    #[structopt(flatten)]
    global: GlobalOptions,

    /// Member acting on the group
    #[structopt(long = "as", env = "PINTS_MEMBER")]
    acting: Option<String>,

    #[structopt(subcommand)]
    command: Command,
}

#[derive(StructOpt)]
pub enum Command {
    /// Start a new group with the acting member in it
    #[structopt(name = "init")]
    Init { name: String },

    /// List every group in the data directory, newest first
    #[structopt(name = "groups")]
    Groups,

    /// Record that FROM owes TO a pint
    #[structopt(name = "add")]
    Add {
        from: String,
        to: String,
        #[structopt(long, short, default_value = "")]
        note: String,
        #[structopt(long, parse(from_os_str))]
        photo: Option<PathBuf>,
    },

    /// Mark the most recent unpaid pint FROM owes TO as paid
    #[structopt(name = "clear")]
    Clear { from: String, to: String },

    /// Mark one pint as paid, by its position in the history
    #[structopt(name = "paid")]
    Paid { from: String, to: String, index: usize },

    /// Mark one pint as unpaid again
    #[structopt(name = "unpaid")]
    Unpaid { from: String, to: String, index: usize },

    /// Delete one pint from the history
    #[structopt(name = "remove")]
    Remove { from: String, to: String, index: usize },

    #[structopt(name = "join")]
    Join { member: String },

    /// Remove a member and every pint they owe or are owed
    #[structopt(name = "leave")]
    Leave { member: String },

    #[structopt(name = "rename")]
    Rename { name: String },

    /// Set or clear a member's avatar, deleting the image it replaces
    #[structopt(name = "avatar")]
    Avatar {
        member: String,
        #[structopt(parse(from_os_str))]
        image: Option<PathBuf>,
    },
}

fn read_image(image: &Path) -> Result<(Vec<u8>, String)> {
    let bytes = fs::read(image).with_context(|| format!("cannot read {}", image.display()))?;
    let extension = image.extension().and_then(|e| e.to_str()).unwrap_or("");

    Ok((bytes, extension.to_string()))
}

fn describe(change: Option<Change>) -> String {
    match change {
        None => "Nothing to do.".to_string(),
        Some(Change::InsertEntry { pair, entry }) if entry.note.is_empty() => {
            format!("{} owes {} a pint", pair.debtor, pair.creditor)
        }
        Some(Change::InsertEntry { pair, entry }) => {
            format!("{} owes {}: {:?}", pair.debtor, pair.creditor, entry.note)
        }
        Some(Change::UpdatePaid { pair, paid: true, .. }) => {
            format!("{} paid back {}", pair.debtor, pair.creditor)
        }
        Some(Change::UpdatePaid { .. }) => "Marked as unpaid".to_string(),
        Some(Change::DeleteEntry { .. }) => "Removed from history".to_string(),
        Some(Change::InsertMember(member)) => format!("{} joined the group", member.id),
        Some(Change::DeleteMember { id, .. }) => format!("{} left the group", id),
        Some(Change::UpdateGroupName(name)) => format!("Now called {:?}", name),
        Some(Change::UpdateMemberAvatar { id, .. }) => format!("Updated {}'s avatar", id),
    }
}

fn apply(session: &mut Session<JsonFileStore>, command: Command, blobs: &mut FileBlobStore) -> Result<Option<Change>> {
    let change = match command {
        Command::Init { .. } | Command::Groups => bail!("not a group command"),
        Command::Add {
            from,
            to,
            note,
            photo: Some(path),
        } => {
            let (bytes, extension) = read_image(&path)?;

            session.add_entry_with_photo(&Pair::new(from, to), &note, &bytes, &extension, blobs)?
        }
        Command::Add { from, to, note, photo: None } => session.add_entry(&Pair::new(from, to), &note, None)?,
        Command::Clear { from, to } => session.clear_most_recent_unpaid(&Pair::new(from, to))?,
        Command::Paid { from, to, index } => {
            session.set_paid(&Pair::new(from, to), EntryRef::Index(index), true)?
        }
        Command::Unpaid { from, to, index } => {
            session.set_paid(&Pair::new(from, to), EntryRef::Index(index), false)?
        }
        Command::Remove { from, to, index } => {
            session.remove_entry(&Pair::new(from, to), EntryRef::Index(index))?
        }
        Command::Join { member } => session.add_member(Member::new(member))?,
        Command::Leave { member } => session.remove_member(&MemberId::from(member))?,
        Command::Rename { name } => session.rename_group(&name)?,
        Command::Avatar { member, image } => {
            let image = image.as_deref().map(read_image).transpose()?;
            let image = image.as_ref().map(|(bytes, extension)| (bytes.as_slice(), extension.as_str()));

            session.replace_avatar(&MemberId::from(member), image, blobs)?
        }
    };

    Ok(change)
}

fn main() -> Result<()> {
    init_tracing();

    let options = Options::from_args();
    let global = &options.global;
    let store = JsonFileStore::new(&global.data_dir);
    let mut blobs = FileBlobStore::new(global.photos_dir());

    match options.command {
        Command::Init { name } => {
            let creator = options
                .acting
                .context("`init` needs `--as <member>` to know who is creating the group")?;

            let session = Session::create(
                store,
                &global.group,
                &name,
                Member::new(creator),
                SystemClock,
                global.limits.clone(),
            )?;

            info!(group = session.group(), "group ready");
            println!("{} is ready", session.state().name);
        }
        Command::Groups => {
            let groups = store.list()?;

            if groups.is_empty() {
                println!("No groups yet.");
            }

            for group in groups {
                let created = group.created_at.map(short_datetime).unwrap_or_default();
                println!("{:16} {:32} {}", group.id, group.name, created);
            }
        }
        command => {
            let mut session = Session::open(store, &global.group, SystemClock, global.limits.clone())?;

            println!("{}", describe(apply(&mut session, command, &mut blobs)?));
        }
    }

    Ok(())
}
