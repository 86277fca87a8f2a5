//! Headless CLI surface (spec §6): `--console`, `--port`, `--connect`. The
//! interactive console/GUI front end itself is out of scope (spec §1); this
//! only parses the flags the core's entry point needs.

use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about = "Peer-to-peer secure messaging and file transfer")]
pub struct Cli {
    /// Run headless with a no-op progress sink. This build has no GUI event
    /// loop, so `main` refuses to start without this flag.
    #[arg(long, default_value_t = false)]
    pub console: bool,

    /// TCP port to listen on.
    #[arg(long, default_value_t = crate::config::DEFAULT_PORT)]
    pub port: u16,

    /// Peer address to HELLO on startup. A bare host is completed with the
    /// default port.
    #[arg(long)]
    pub connect: Option<String>,
}

impl Cli {
    /// Resolves `--connect` to a socket address, appending the default port
    /// when the user supplied a bare host.
    pub fn connect_addr(&self) -> Option<String> {
        self.connect.as_ref().map(|addr| {
            if addr.contains(':') {
                addr.clone()
            } else {
                format!("{addr}:{}", crate::config::DEFAULT_PORT)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_host_gets_default_port_appended() {
        let cli = Cli { console: true, port: 27002, connect: Some("10.0.0.5".into()) };
        assert_eq!(cli.connect_addr().unwrap(), "10.0.0.5:27002");
    }

    #[test]
    fn host_with_port_is_left_untouched() {
        let cli = Cli { console: true, port: 27002, connect: Some("10.0.0.5:9999".into()) };
        assert_eq!(cli.connect_addr().unwrap(), "10.0.0.5:9999");
    }

    #[test]
    fn no_connect_flag_yields_none() {
        let cli = Cli { console: true, port: 27002, connect: None };
        assert!(cli.connect_addr().is_none());
    }
}
