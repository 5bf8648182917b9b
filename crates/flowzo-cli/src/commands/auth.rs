use clap::Subcommand;
use flowzo_core::integrations::{GitHubClient, Integration, LinearClient};

#[derive(Subcommand)]
pub enum AuthAction {
    /// GitHub: login / logout / status
    Github {
        #[command(subcommand)]
        action: AuthOp,
    },
    /// Linear: login / logout / status
    Linear {
        #[command(subcommand)]
        action: AuthOp,
    },
}

#[derive(Subcommand)]
pub enum AuthOp {
    /// Store an API token in the OS keyring
    Login {
        /// Personal access token (GitHub) or API key (Linear)
        #[arg(long)]
        token: String,
    },
    /// Remove credentials
    Logout,
    /// Check authentication status
    Status {
        /// Also verify the credential against the service
        #[arg(long)]
        check: bool,
    },
}

pub async fn run(action: AuthAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        AuthAction::Github { action: op } => {
            let mut client = GitHubClient::new();
            if let AuthOp::Status { check: true } = op {
                if client.is_authenticated() {
                    let user = client.test_connection().await?;
                    println!("GitHub authenticated as {}", user.login);
                    return Ok(());
                }
            }
            handle(&mut client, op)
        }
        AuthAction::Linear { action: op } => {
            let mut client = LinearClient::new();
            if let AuthOp::Status { check: true } = op {
                if client.is_authenticated() {
                    let viewer = client.test_connection().await?;
                    println!("Linear authenticated as {}", viewer.name);
                    return Ok(());
                }
            }
            handle(&mut client, op)
        }
    }
}

fn handle(integration: &mut dyn Integration, op: AuthOp) -> Result<(), Box<dyn std::error::Error>> {
    let name = integration.display_name();
    match op {
        AuthOp::Login { token } => {
            let token = token.trim();
            if token.is_empty() {
                return Err(format!(
                    "--token must not be empty (flowzo auth {} login --token <TOKEN>)",
                    integration.name()
                )
                .into());
            }
            integration.set_credentials(token)?;
            println!("{name} credentials saved");
        }
        AuthOp::Logout => {
            integration.disconnect()?;
            println!("{name} disconnected");
        }
        AuthOp::Status { .. } => {
            if integration.is_authenticated() {
                println!(
                    "{name}: authenticated (keyring entry '{}')",
                    integration.credential_key()
                );
            } else {
                println!("{name}: not authenticated");
            }
        }
    }
    Ok(())
}
