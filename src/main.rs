use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
mod auth;
use notevault::{
    Algorithm, Config, FileStore, KeyState, Note, NoteVault, ProvisioningMode, StoredState,
    VaultError, transfer,
};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, clap::Args)]
struct Argon2Args {
    /// Argon2 memory cost in KiB for a new password (default: 65536)
    #[arg(long = "argon-mem")]
    mem_cost_kib: Option<u32>,

    /// Argon2 time cost / iterations (default: 2)
    #[arg(long = "argon-time")]
    time_cost: Option<u32>,

    /// Argon2 parallelism (default: 1)
    #[arg(long = "argon-parallelism")]
    parallelism: Option<u32>,
}

impl Argon2Args {
    fn apply(&self, config: &mut Config) -> Result<()> {
        if self.mem_cost_kib.is_none() && self.time_cost.is_none() && self.parallelism.is_none() {
            return Ok(());
        }

        config.kdf = notevault::KdfParams::new(
            self.mem_cost_kib.unwrap_or(config.kdf.mem_cost_kib()),
            self.time_cost.unwrap_or(config.kdf.time_cost()),
            self.parallelism.unwrap_or(config.kdf.parallelism()),
        )?;
        Ok(())
    }
}

#[derive(Debug, Parser)]
#[command(name = "notevault")]
#[command(
    version,
    about = "Offline notes that never touch the disk unencrypted."
)]
struct Cli {
    /// Directory holding the note store
    #[arg(long, global = true, value_name = "PATH", env = "NOTEVAULT_DIR")]
    dir: Option<PathBuf>,

    /// AEAD for new writes (aegis256 or xchacha20poly1305); probed when unset
    #[arg(long, global = true, value_name = "ALG")]
    aead: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Initializes the note store
    Init {
        /// Use a random device key instead of a password
        #[arg(long)]
        random: bool,

        #[command(flatten)]
        argon2: Argon2Args,
    },

    /// Checks the password and re-encrypts legacy plaintext notes
    Unlock,

    /// Adds a note
    #[command(arg_required_else_help = true)]
    Add { title: String, body: Option<String> },

    /// Edits a note
    #[command(arg_required_else_help = true)]
    Edit {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        body: Option<String>,
    },

    /// Lists notes
    List,

    /// Prints a note
    #[command(arg_required_else_help = true)]
    Show { id: String },

    /// Removes a note
    #[command(arg_required_else_help = true)]
    Remove { id: String },

    /// Writes all notes as plaintext JSON
    Export {
        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Merges notes from an export file
    #[command(arg_required_else_help = true)]
    Import { file: PathBuf },

    /// Replaces a stored random key with a password
    Migrate {
        #[command(flatten)]
        argon2: Argon2Args,
    },

    /// Prints a link carrying the device key
    #[command(arg_required_else_help = true)]
    ShareLink { base_url: String },

    /// Adopts the key from a shared link
    #[command(arg_required_else_help = true)]
    Adopt { link: String },

    /// Shows information about the store
    Info,
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("NOTEVAULT_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn resolve_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::from_env()?;
    if let Some(dir) = &cli.dir {
        config.data_dir = dir.clone();
    }
    if let Some(aead) = &cli.aead {
        config.algorithm = Some(aead.parse::<Algorithm>()?);
    }
    Ok(config)
}

/// Open the store and make sure a key is loaded.
fn open_unlocked(config: &Config) -> Result<NoteVault<FileStore>> {
    let mut vault = NoteVault::open_default(config)?;

    match vault.state() {
        KeyState::Unlocked => {}
        KeyState::Locked => {
            let password = auth::read_password()?;
            vault.unlock(&password).map_err(|e| match e {
                VaultError::WrongPassword => anyhow::anyhow!("incorrect password"),
                other => anyhow::Error::new(other).context("unable to unlock note store"),
            })?;
        }
        KeyState::Uninitialized if config.allow_plaintext => {}
        KeyState::Uninitialized => {
            bail!("note store is not initialized; run `notevault init`")
        }
    }

    Ok(vault)
}

/// Load the state, encrypting a legacy plaintext copy right away.
fn load_state(vault: &NoteVault<FileStore>) -> Result<StoredState> {
    let outcome = vault.load().map_err(|e| match e {
        VaultError::UnreadableStore => {
            anyhow::anyhow!("stored notes are unreadable with this key (left untouched)")
        }
        VaultError::NoKeyAvailable => anyhow::anyhow!("note store is locked; unlock it first"),
        other => other.into(),
    })?;

    if outcome.pending_reencryption && vault.is_unlocked() {
        vault
            .save(&outcome.state)
            .context("failed to encrypt legacy notes")?;
        tracing::info!("encrypted legacy plaintext notes");
    }

    Ok(outcome.state)
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    init_logging();

    let args = Cli::parse();
    let mut config = resolve_config(&args)?;

    match args.command {
        Commands::Init { random, argon2 } => {
            argon2.apply(&mut config)?;
            let mut vault = NoteVault::open_default(&config)?;
            if vault.mode() != ProvisioningMode::Fresh {
                bail!("note store already exists");
            }

            if random {
                vault.setup_random()?;
            } else {
                let password = match std::env::var(auth::PASSWORD_ENV) {
                    Ok(pw) if !pw.is_empty() => zeroize::Zeroizing::new(pw),
                    _ => auth::read_new_password_with_confirmation()?,
                };
                vault.setup_password(&password)?;
            }

            let state = load_state(&vault)?;
            vault.save(&state)?;
            println!("note store initialized");
        }
        Commands::Unlock => {
            let vault = open_unlocked(&config)?;
            let state = load_state(&vault)?;
            println!("unlocked: {} notes", state.notes.len());
        }
        Commands::Add { title, body } => {
            let vault = open_unlocked(&config)?;
            let mut state = load_state(&vault)?;
            let note = Note::new(title, body.unwrap_or_default());
            let id = note.id.clone();
            state.add_note(note)?;
            vault.save(&state)?;
            println!("added note {id}");
        }
        Commands::Edit { id, title, body } => {
            let vault = open_unlocked(&config)?;
            let mut state = load_state(&vault)?;
            state.update_note(&id, title.as_deref(), body.as_deref())?;
            vault.save(&state)?;
            println!("note {id} updated");
        }
        Commands::List => {
            let vault = open_unlocked(&config)?;
            let state = load_state(&vault)?;

            if state.notes.is_empty() {
                println!("No notes stored.");
                return Ok(());
            }

            for note in &state.notes {
                println!("{}  {}", note.id, note.title);
            }
        }
        Commands::Show { id } => {
            let vault = open_unlocked(&config)?;
            let state = load_state(&vault)?;
            let note = state
                .note(&id)
                .with_context(|| format!("note '{id}' not found"))?;
            println!("{}\n\n{}", note.title, note.content);
        }
        Commands::Remove { id } => {
            let vault = open_unlocked(&config)?;
            let mut state = load_state(&vault)?;
            state.remove_note(&id)?;
            vault.save(&state)?;
            println!("note {id} removed");
        }
        Commands::Export { output } => {
            let vault = open_unlocked(&config)?;
            let state = load_state(&vault)?;
            let json = transfer::export(&state)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, json)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    eprintln!("exported {} notes as PLAINTEXT to {}", state.notes.len(), path.display());
                }
                None => println!("{json}"),
            }
        }
        Commands::Import { file } => {
            let size = std::fs::metadata(&file)
                .with_context(|| format!("failed to read {}", file.display()))?
                .len();
            if size > transfer::MAX_IMPORT_BYTES as u64 {
                bail!(
                    "import rejected: {} is larger than {} bytes",
                    file.display(),
                    transfer::MAX_IMPORT_BYTES
                );
            }
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let vault = open_unlocked(&config)?;
            let mut state = load_state(&vault)?;
            let summary = transfer::import_into(&mut state, &text)?;
            vault.save(&state)?;
            println!(
                "imported {} notes, {} tags, {} folders",
                summary.notes, summary.tags, summary.folders
            );
        }
        Commands::Migrate { argon2 } => {
            argon2.apply(&mut config)?;
            let mut vault = NoteVault::open_default(&config)?;
            if vault.mode() != ProvisioningMode::Legacy && !vault.migration_pending() {
                bail!("nothing to migrate: store does not use a stored random key");
            }
            let password = auth::read_new_password_with_confirmation()?;
            vault
                .migrate_to_password(&password)
                .context("migration failed; the stored key was kept, retry with the same password")?;
            println!("note store is now password protected");
        }
        Commands::ShareLink { base_url } => {
            let vault = open_unlocked(&config)?;
            println!("{}", vault.share_link(&base_url)?);
        }
        Commands::Adopt { link } => {
            let mut vault = NoteVault::open_default(&config)?;
            let cleaned = vault.adopt_shared_link(&link)?;
            println!("key adopted; continue at {cleaned}");
        }
        Commands::Info => {
            let vault = NoteVault::open_default(&config)?;
            println!("directory:  {}", config.data_dir.display());
            println!("mode:       {:?}", vault.mode());
            println!("state:      {:?}", vault.state());
            println!("algorithm:  {}", vault.algorithm());
            if vault.migration_pending() {
                println!("migration:  pending (run `notevault unlock`)");
            }
            if config.allow_plaintext {
                println!("WARNING:    plaintext fallback enabled");
            }
        }
    }

    Ok(())
}
