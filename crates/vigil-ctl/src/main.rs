//! vigil-ctl — command-line interface for the Vigil daemon.

use anyhow::{Context, Result};
use futures::StreamExt;
use serde::Deserialize;

const DEFAULT_PORT: u16 = 3090;

// ── Response types ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct SessionResponse {
    identity:     String,
    presence_id:  String,
    display_name: String,
}

#[derive(Deserialize)]
struct FriendsResponse {
    friends: Vec<FriendInfo>,
    updated: u64,
}

#[derive(Deserialize)]
struct FriendInfo {
    id:          String,
    name:        String,
    is_favorite: bool,
    presence:    PresenceInfo,
}

#[derive(Deserialize)]
struct PresenceInfo {
    state: String,
    title: Option<TitleInfo>,
}

#[derive(Deserialize)]
struct TitleInfo {
    name: String,
}

#[derive(Deserialize)]
struct TokenListResponse {
    tokens: Vec<TokenInfo>,
}

#[derive(Deserialize)]
struct TokenInfo {
    token:      String,
    created_at: u64,
}

#[derive(Deserialize)]
struct CreateTokenResponse {
    token: String,
}

#[derive(Deserialize)]
struct LookupResponse {
    user: LookupUser,
}

#[derive(Deserialize)]
struct LookupUser {
    id:   String,
    name: String,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error:         String,
    error_message: String,
}

// ── HTTP helpers ──────────────────────────────────────────────────────────────

struct Client {
    http: reqwest::Client,
    base: String,
    secret: String,
}

impl Client {
    fn new(port: u16, secret: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: format!("http://127.0.0.1:{}/api/presence", port),
            secret,
        }
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T> {
        let response = self
            .http
            .get(format!("{}{}", self.base, path))
            .header("Authorization", format!("Secret {}", self.secret))
            .send()
            .await
            .with_context(|| format!("failed to connect to vigild at {} — is it running?", self.base))?;
        decode(response).await
    }

    async fn post_json<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T> {
        let response = self
            .http
            .post(format!("{}{}", self.base, path))
            .header("Authorization", format!("Secret {}", self.secret))
            .json(&body)
            .send()
            .await
            .with_context(|| format!("failed to connect to vigild at {} — is it running?", self.base))?;
        decode(response).await
    }

    async fn delete(&self, path: &str, token: &str) -> Result<()> {
        let response = self
            .http
            .delete(format!("{}{}", self.base, path))
            .header("Authorization", format!("Bearer {}", token))
            .send()
            .await
            .context("failed to connect to vigild")?;
        if response.status().is_success() {
            Ok(())
        } else {
            let err: ErrorResponse = response.json().await.context("failed to parse error")?;
            anyhow::bail!("{}: {}", err.error, err.error_message)
        }
    }
}

async fn decode<T: for<'de> Deserialize<'de>>(response: reqwest::Response) -> Result<T> {
    if response.status().is_success() {
        response.json::<T>().await.context("failed to parse response")
    } else {
        let err: ErrorResponse = response
            .json()
            .await
            .context("request failed and the error body was unreadable")?;
        anyhow::bail!("{}: {}", err.error, err.error_message)
    }
}

// ── Subcommand handlers ───────────────────────────────────────────────────────

async fn cmd_session(client: &Client) -> Result<()> {
    let resp: SessionResponse = client.get_json("/session").await?;

    println!("═══════════════════════════════════════");
    println!("  Vigil Session");
    println!("═══════════════════════════════════════");
    println!("  Identity     : {}", resp.identity);
    println!("  Presence id  : {}", resp.presence_id);
    println!("  Display name : {}", resp.display_name);

    Ok(())
}

async fn cmd_friends(client: &Client) -> Result<()> {
    let resp: FriendsResponse = client.get_json("/friends").await?;

    if resp.friends.is_empty() {
        println!("No friends on the roster.");
        return Ok(());
    }

    println!("═══════════════════════════════════════");
    println!("  Friends ({})  [updated {}]", resp.friends.len(), resp.updated);
    println!("═══════════════════════════════════════");

    for f in &resp.friends {
        let marker = if f.is_favorite { "★" } else { " " };
        let doing = match &f.presence.title {
            Some(title) => format!("{} — {}", f.presence.state, title.name),
            None => f.presence.state.clone(),
        };
        println!("  {} {:20} {:16} {}", marker, f.name, f.id, doing);
    }

    Ok(())
}

async fn cmd_tokens(client: &Client) -> Result<()> {
    let resp: TokenListResponse = client.get_json("/tokens").await?;

    if resp.tokens.is_empty() {
        println!("No scoped tokens issued.");
        return Ok(());
    }

    println!("═══════════════════════════════════════");
    println!("  Scoped Tokens ({})", resp.tokens.len());
    println!("═══════════════════════════════════════");
    for t in &resp.tokens {
        println!("  {}  (created {})", t.token, t.created_at);
    }

    Ok(())
}

async fn cmd_token_create(client: &Client, policy_json: &str) -> Result<()> {
    let policy: serde_json::Value =
        serde_json::from_str(policy_json).context("--policy must be valid JSON")?;
    let resp: CreateTokenResponse = client
        .post_json("/tokens", serde_json::json!({ "policy": policy }))
        .await?;
    println!("{}", resp.token);
    Ok(())
}

async fn cmd_token_revoke(client: &Client, token: &str) -> Result<()> {
    client.delete("/token", token).await?;
    println!("Token revoked.");
    Ok(())
}

async fn cmd_lookup(client: &Client, code: &str) -> Result<()> {
    let resp: LookupResponse = client.get_json(&format!("/friendcode/{}", code)).await?;
    println!("{}  {}", resp.user.id, resp.user.name);
    Ok(())
}

/// Tail the presence event stream, printing one line per event.
async fn cmd_watch(client: &Client) -> Result<()> {
    let response = client
        .http
        .get(format!("{}/events", client.base))
        .header("Authorization", format!("Secret {}", client.secret))
        .send()
        .await
        .context("failed to connect to vigild")?;
    anyhow::ensure!(
        response.status().is_success(),
        "event stream rejected: {}",
        response.status()
    );

    println!("Watching presence events (ctrl-c to stop)...");
    let mut stream = response.bytes_stream();
    let mut buffer = String::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("event stream broke")?;
        buffer.push_str(&String::from_utf8_lossy(&chunk));

        while let Some(pos) = buffer.find('\n') {
            let line = buffer[..pos].trim().to_string();
            buffer.drain(..=pos);
            if let Some(event) = line.strip_prefix("event: ") {
                print!("{:24} ", event);
            } else if let Some(data) = line.strip_prefix("data: ") {
                println!("{}", data);
            }
        }
    }

    Ok(())
}

fn print_usage() {
    println!("Usage: vigil-ctl [--port <port>] [--secret <secret>] <command>");
    println!();
    println!("Commands:");
    println!("  session                   Show the authenticated session");
    println!("  friends                   List the friend roster with presence");
    println!("  tokens                    List issued scoped tokens");
    println!("  token create <policy>     Issue a scoped token (policy as JSON)");
    println!("  token revoke <token>      Revoke a scoped token");
    println!("  lookup <friend-code>      Resolve a friend code (####-####-####)");
    println!("  watch                     Tail the presence event stream");
    println!();
    println!("Options:");
    println!("  --port <port>       API port (default: {})", DEFAULT_PORT);
    println!("  --secret <secret>   Identity secret (default: $VIGIL_SECRET)");
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    // Parse options
    let mut port = DEFAULT_PORT;
    let mut secret = std::env::var("VIGIL_SECRET").unwrap_or_default();
    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--port" {
            i += 1;
            port = args.get(i)
            .context("--port requires a value")?
            .parse()
            .context("--port must be a number")?;
        } else if args[i] == "--secret" {
            i += 1;
            secret = args.get(i).context("--secret requires a value")?.clone();
        } else {
            remaining.push(&args[i]);
        }
        i += 1;
    }

    let client = Client::new(port, secret);

    match remaining.as_slice() {
        ["session"] | []                   => cmd_session(&client).await,
        ["friends"]                        => cmd_friends(&client).await,
        ["tokens"]                         => cmd_tokens(&client).await,
        ["token", "create", policy]        => cmd_token_create(&client, policy).await,
        ["token", "revoke", token]         => cmd_token_revoke(&client, token).await,
        ["lookup", code]                   => cmd_lookup(&client, code).await,
        ["watch"]                          => cmd_watch(&client).await,
        ["help"] | ["--help"] | ["-h"]     => { print_usage(); Ok(()) }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
