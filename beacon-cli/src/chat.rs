//! Interactive chat over stdin/stdout.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};

use beacon_social::{
    ClientConfig, Identity, LoginConfig, SessionController, SocialEvent, UrlConnector,
};

pub struct ChatOptions {
    pub log_url: String,
    pub agent: String,
    pub identity: Option<String>,
    pub poll_secs: u64,
}

enum Command<'a> {
    Users,
    Clients,
    Quit,
    Send { to: &'a str, body: &'a str },
    Invalid,
}

fn parse_line(line: &str) -> Command<'_> {
    match line.trim() {
        "/users" => Command::Users,
        "/clients" => Command::Clients,
        "/quit" => Command::Quit,
        rest => match rest.split_once(char::is_whitespace) {
            Some((to, body)) if !to.starts_with('/') => Command::Send {
                to,
                body: body.trim_start(),
            },
            _ => Command::Invalid,
        },
    }
}

fn print_event(event: &SocialEvent) {
    match event {
        SocialEvent::ClientState(record) => {
            println!("* {} is {}", record.identity, record.status.as_str());
        }
        SocialEvent::UserProfile(profile) => {
            println!("* discovered {}", profile.display_name);
        }
        SocialEvent::Message(message) => {
            println!("<{}> {}", message.from.identity, message.body);
        }
    }
}

pub async fn run(options: ChatOptions) -> anyhow::Result<()> {
    let identity = options
        .identity
        .map(Identity::new)
        .unwrap_or_else(Identity::generate);
    let config = ClientConfig {
        poll_interval: Duration::from_secs(options.poll_secs.max(1)),
        ..ClientConfig::default()
    };

    let mut session = SessionController::new(identity, Arc::new(UrlConnector), config);
    let mut events = session
        .take_event_rx()
        .ok_or_else(|| anyhow::anyhow!("event stream already taken"))?;

    session
        .login(LoginConfig::new(options.log_url, options.agent))
        .await
        .map_err(|e| anyhow::anyhow!("{}: {e}", e.code()))?;
    println!("Logged in as {}", session.local_identity());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            Some(event) = events.recv() => print_event(&event),
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match parse_line(&line) {
                    Command::Quit => break,
                    Command::Users => match session.get_users().await {
                        Ok(users) => {
                            for profile in users.values() {
                                println!("  {}", profile.display_name);
                            }
                        }
                        Err(e) => println!("! {}", e.code()),
                    },
                    Command::Clients => match session.get_clients().await {
                        Ok(clients) => {
                            for record in clients.values() {
                                println!("  {} {}", record.identity, record.status.as_str());
                            }
                        }
                        Err(e) => println!("! {}", e.code()),
                    },
                    Command::Send { to, body } => {
                        if let Err(e) = session.send_message(to, body).await {
                            println!("! {}: {e}", e.code());
                        }
                    }
                    Command::Invalid => {
                        println!("! usage: <identity> <text> | /users | /clients | /quit");
                    }
                }
            }
        }
    }

    session
        .logout()
        .await
        .map_err(|e| anyhow::anyhow!("{}: {e}", e.code()))?;
    while let Ok(event) = events.try_recv() {
        print_event(&event);
    }
    Ok(())
}
