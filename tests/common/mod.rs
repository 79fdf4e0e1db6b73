//! In-process scripted FTP server for integration tests.
//!
//! Speaks just enough RFC 959 for the client: USER/PASS, TYPE, PWD, NOOP,
//! QUIT, PASV/EPSV/PORT/EPRT, LIST, RETR, STOR, MKD, DELE, RMD, RNFR/RNTO.
//! RETR can be told to reset its data connection part way through.
//! Every command line received is recorded in arrival order.

#![allow(dead_code)]

use ftpbrowse::ConnectionDescriptor;
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};

pub const USER: &str = "user";
pub const PASS: &str = "pass";

#[derive(Clone, Default)]
pub struct MockConfig {
    pub listings: HashMap<String, String>,
    pub files: HashMap<String, Vec<u8>>,
    pub dirs: HashSet<String>,
    pub list_delays: HashMap<String, Duration>,
    /// Final reply sent after a STOR instead of `226`.
    pub stor_reply: Option<String>,
    /// Drop the control connection, without replying, the first time this
    /// verb arrives.
    pub drop_once_on: Option<String>,
    /// RETR sends only this many bytes, resets the data connection and
    /// answers `426`.
    pub data_abort_after: Option<usize>,
}

impl MockConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_listing(mut self, path: &str, payload: &str) -> Self {
        self.listings.insert(path.to_string(), payload.to_string());
        self
    }

    pub fn with_file(mut self, path: &str, bytes: &[u8]) -> Self {
        self.files.insert(path.to_string(), bytes.to_vec());
        self
    }

    pub fn with_dir(mut self, path: &str) -> Self {
        self.dirs.insert(path.to_string());
        self
    }

    pub fn with_list_delay(mut self, path: &str, delay: Duration) -> Self {
        self.list_delays.insert(path.to_string(), delay);
        self
    }

    pub fn with_stor_reply(mut self, reply: &str) -> Self {
        self.stor_reply = Some(reply.to_string());
        self
    }

    pub fn drop_once_on(mut self, verb: &str) -> Self {
        self.drop_once_on = Some(verb.to_string());
        self
    }

    pub fn with_data_abort(mut self, bytes: usize) -> Self {
        self.data_abort_after = Some(bytes);
        self
    }
}

#[derive(Default)]
struct ServerState {
    commands: Vec<String>,
    files: HashMap<String, Vec<u8>>,
    dirs: HashSet<String>,
    listings: HashMap<String, String>,
    drop_once_on: Option<String>,
}

pub struct MockServer {
    pub addr: SocketAddr,
    state: Arc<Mutex<ServerState>>,
}

impl MockServer {
    pub async fn start(config: MockConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(Mutex::new(ServerState {
            commands: Vec::new(),
            files: config.files.clone(),
            dirs: config.dirs.clone(),
            listings: config.listings.clone(),
            drop_once_on: config.drop_once_on.clone(),
        }));
        let config = Arc::new(config);

        let accept_state = state.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let config = config.clone();
                let state = accept_state.clone();
                tokio::spawn(async move {
                    let _ = serve(stream, config, state).await;
                });
            }
        });

        Self { addr, state }
    }

    /// Descriptor with valid credentials and short timeouts.
    pub fn descriptor(&self) -> ConnectionDescriptor {
        let mut d = ConnectionDescriptor::new("127.0.0.1", self.addr.port(), USER, PASS);
        d.connect_timeout_sec = 5;
        d.reply_timeout_sec = 5;
        d.data_timeout_sec = 5;
        d
    }

    pub fn commands(&self) -> Vec<String> {
        self.state.lock().unwrap().commands.clone()
    }

    /// Number of received commands whose verb is `verb`.
    pub fn count(&self, verb: &str) -> usize {
        self.commands()
            .iter()
            .filter(|c| c.split(' ').next() == Some(verb))
            .count()
    }

    /// Index of the first command line equal to `line`.
    pub fn position(&self, line: &str) -> Option<usize> {
        self.commands().iter().position(|c| c == line)
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.state.lock().unwrap().files.get(path).cloned()
    }

    pub fn has_dir(&self, path: &str) -> bool {
        self.state.lock().unwrap().dirs.contains(path)
    }
}

enum DataPlan {
    Passive(TcpListener),
    Active(SocketAddr),
}

impl DataPlan {
    async fn open(self) -> std::io::Result<TcpStream> {
        match self {
            DataPlan::Passive(listener) => {
                let (stream, _) = tokio::time::timeout(Duration::from_secs(5), listener.accept())
                    .await
                    .map_err(|_| std::io::Error::from(std::io::ErrorKind::TimedOut))??;
                Ok(stream)
            }
            DataPlan::Active(addr) => TcpStream::connect(addr).await,
        }
    }
}

async fn reply(wr: &mut OwnedWriteHalf, line: &str) -> std::io::Result<()> {
    wr.write_all(format!("{}\r\n", line).as_bytes()).await
}

fn parse_port(arg: &str) -> Option<SocketAddr> {
    let n: Vec<u16> = arg
        .split(',')
        .map(|p| p.trim().parse().ok())
        .collect::<Option<Vec<_>>>()?;
    if n.len() != 6 {
        return None;
    }
    format!("{}.{}.{}.{}:{}", n[0], n[1], n[2], n[3], n[4] * 256 + n[5])
        .parse()
        .ok()
}

fn parse_eprt(arg: &str) -> Option<SocketAddr> {
    let parts: Vec<&str> = arg.split('|').collect();
    if parts.len() < 4 {
        return None;
    }
    format!("{}:{}", parts[2], parts[3]).parse().ok()
}

async fn serve(
    stream: TcpStream,
    config: Arc<MockConfig>,
    state: Arc<Mutex<ServerState>>,
) -> std::io::Result<()> {
    let (rd, mut wr) = stream.into_split();
    let mut lines = BufReader::new(rd).lines();
    wr.write_all(b"220-Welcome to the mock server\r\n220 Ready\r\n")
        .await?;

    let mut user = String::new();
    let mut data: Option<DataPlan> = None;
    let mut rename_from: Option<String> = None;

    while let Some(line) = lines.next_line().await? {
        let (verb, arg) = match line.split_once(' ') {
            Some((v, a)) => (v.to_ascii_uppercase(), a.to_string()),
            None => (line.to_ascii_uppercase(), String::new()),
        };
        {
            let mut st = state.lock().unwrap();
            st.commands.push(line.clone());
            if st.drop_once_on.as_deref() == Some(verb.as_str()) {
                st.drop_once_on = None;
                return Ok(());
            }
        }

        match verb.as_str() {
            "USER" => {
                user = arg;
                reply(&mut wr, "331 Password required").await?;
            }
            "PASS" => {
                if user == USER && arg == PASS {
                    reply(&mut wr, "230 Logged in").await?;
                } else {
                    reply(&mut wr, "530 Login incorrect.").await?;
                }
            }
            "TYPE" => reply(&mut wr, "200 Switching to Binary mode.").await?,
            "PWD" => reply(&mut wr, "257 \"/\" is the current directory").await?,
            "NOOP" => reply(&mut wr, "200 NOOP ok.").await?,
            "QUIT" => {
                reply(&mut wr, "221 Goodbye.").await?;
                return Ok(());
            }
            "PASV" => {
                let listener = TcpListener::bind("127.0.0.1:0").await?;
                let port = listener.local_addr()?.port();
                data = Some(DataPlan::Passive(listener));
                reply(
                    &mut wr,
                    &format!(
                        "227 Entering Passive Mode (127,0,0,1,{},{}).",
                        port / 256,
                        port % 256
                    ),
                )
                .await?;
            }
            "EPSV" => {
                let listener = TcpListener::bind("127.0.0.1:0").await?;
                let port = listener.local_addr()?.port();
                data = Some(DataPlan::Passive(listener));
                reply(
                    &mut wr,
                    &format!("229 Entering Extended Passive Mode (|||{}|)", port),
                )
                .await?;
            }
            "PORT" | "EPRT" => {
                let target = if verb == "PORT" {
                    parse_port(&arg)
                } else {
                    parse_eprt(&arg)
                };
                match target {
                    Some(addr) => {
                        data = Some(DataPlan::Active(addr));
                        reply(&mut wr, "200 Command okay.").await?;
                    }
                    None => reply(&mut wr, "501 Syntax error in parameters").await?,
                }
            }
            "LIST" => {
                if let Some(delay) = config.list_delays.get(&arg) {
                    tokio::time::sleep(*delay).await;
                }
                let payload = state.lock().unwrap().listings.get(&arg).cloned();
                match (payload, data.take()) {
                    (Some(payload), Some(plan)) => {
                        reply(&mut wr, "150 Here comes the directory listing.").await?;
                        let mut conn = plan.open().await?;
                        conn.write_all(payload.as_bytes()).await?;
                        conn.shutdown().await?;
                        drop(conn);
                        reply(&mut wr, "226 Directory send OK.").await?;
                    }
                    (None, _) => reply(&mut wr, "550 Failed to open directory.").await?,
                    (_, None) => reply(&mut wr, "425 Use PORT or PASV first.").await?,
                }
            }
            "RETR" => {
                let content = state.lock().unwrap().files.get(&arg).cloned();
                match (content, data.take()) {
                    (Some(content), Some(plan)) => {
                        reply(
                            &mut wr,
                            &format!("150 Opening BINARY mode data connection ({} bytes).", content.len()),
                        )
                        .await?;
                        let mut conn = plan.open().await?;
                        if let Some(cut) = config.data_abort_after {
                            conn.write_all(&content[..cut.min(content.len())]).await?;
                            conn.flush().await?;
                            // Let the client drain what was sent before the reset.
                            tokio::time::sleep(Duration::from_millis(200)).await;
                            conn.set_linger(Some(Duration::ZERO))?;
                            drop(conn);
                            reply(&mut wr, "426 Connection closed; transfer aborted.").await?;
                            continue;
                        }
                        conn.write_all(&content).await?;
                        conn.shutdown().await?;
                        drop(conn);
                        reply(&mut wr, "226 Transfer complete.").await?;
                    }
                    (None, _) => reply(&mut wr, "550 Failed to open file.").await?,
                    (_, None) => reply(&mut wr, "425 Use PORT or PASV first.").await?,
                }
            }
            "STOR" => match data.take() {
                Some(plan) => {
                    reply(&mut wr, "150 Ok to send data.").await?;
                    let mut conn = plan.open().await?;
                    let mut buf = Vec::new();
                    conn.read_to_end(&mut buf).await?;
                    drop(conn);
                    state.lock().unwrap().files.insert(arg, buf);
                    let last = config
                        .stor_reply
                        .clone()
                        .unwrap_or_else(|| "226 Transfer complete.".to_string());
                    reply(&mut wr, &last).await?;
                }
                None => reply(&mut wr, "425 Use PORT or PASV first.").await?,
            },
            "MKD" => {
                let created = {
                    let mut st = state.lock().unwrap();
                    if st.dirs.contains(&arg) {
                        false
                    } else {
                        st.dirs.insert(arg.clone());
                        st.listings.insert(arg.clone(), String::new());
                        true
                    }
                };
                if created {
                    let quoted = arg.replace('"', "\"\"");
                    reply(&mut wr, &format!("257 \"{}\" created", quoted)).await?;
                } else {
                    reply(&mut wr, "550 Create directory operation failed.").await?;
                }
            }
            "DELE" => {
                let removed = state.lock().unwrap().files.remove(&arg).is_some();
                if removed {
                    reply(&mut wr, "250 Delete operation successful.").await?;
                } else {
                    reply(&mut wr, "550 Delete operation failed.").await?;
                }
            }
            "RMD" => {
                let removed = state.lock().unwrap().dirs.remove(&arg);
                if removed {
                    reply(&mut wr, "250 Remove directory operation successful.").await?;
                } else {
                    reply(&mut wr, "550 Remove directory operation failed.").await?;
                }
            }
            "RNFR" => {
                let exists = {
                    let st = state.lock().unwrap();
                    st.files.contains_key(&arg) || st.dirs.contains(&arg)
                };
                if exists {
                    rename_from = Some(arg);
                    reply(&mut wr, "350 Ready for RNTO.").await?;
                } else {
                    reply(&mut wr, "550 RNFR command failed.").await?;
                }
            }
            "RNTO" => match rename_from.take() {
                Some(from) => {
                    {
                        let mut st = state.lock().unwrap();
                        if let Some(content) = st.files.remove(&from) {
                            st.files.insert(arg, content);
                        } else if st.dirs.remove(&from) {
                            st.dirs.insert(arg);
                        }
                    }
                    reply(&mut wr, "250 Rename successful.").await?;
                }
                None => reply(&mut wr, "503 RNFR required first.").await?,
            },
            _ => reply(&mut wr, "502 Command not implemented.").await?,
        }
    }
    Ok(())
}
