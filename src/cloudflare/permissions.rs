//! Cloudflare API Permission Group IDs
//!
//! These IDs are PUBLIC and the same for all Cloudflare accounts.
//! They define what a token may do, NOT which resources it can reach.

/// Cloudflare Permission Group IDs (PUBLIC - same for all accounts)
pub mod permission_groups {
    // ============================================================
    // Zone Permissions
    // ============================================================

    /// Create/update/delete DNS records
    pub const DNS_WRITE: &str = "4755a26eedb94da69e1066d98aa820be";
    /// Purge cache
    pub const CACHE_PURGE: &str = "e17beae8b8cb423a99b1730f21238bed";

    // ============================================================
    // Account Permissions
    // ============================================================

    /// Create/delete Pages projects and deployments
    pub const PAGES_WRITE: &str = "8d28297797f24fb8a0c332fe0866ec89";
    /// Read Cloudflare Tunnels and their connectors
    pub const TUNNEL_READ: &str = "efea2ab8357b47888938f101ae5e053f";
    /// Manage Cloudflare Tunnels
    pub const TUNNEL_WRITE: &str = "c07321b023e944ff818fec44d8203567";
    /// Edit account filter lists
    pub const LISTS_WRITE: &str = "2edbf20661fd4661b0fe10e9e12f485c";
}

/// A named right a token policy may grant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    DnsWrite,
    PagesWrite,
    TunnelRead,
    TunnelWrite,
    ListsWrite,
    CachePurge,
}

impl Capability {
    /// The permission group that grants this capability.
    pub fn permission_group_id(&self) -> &'static str {
        match self {
            Capability::DnsWrite => permission_groups::DNS_WRITE,
            Capability::PagesWrite => permission_groups::PAGES_WRITE,
            Capability::TunnelRead => permission_groups::TUNNEL_READ,
            Capability::TunnelWrite => permission_groups::TUNNEL_WRITE,
            Capability::ListsWrite => permission_groups::LISTS_WRITE,
            Capability::CachePurge => permission_groups::CACHE_PURGE,
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capability::DnsWrite => write!(f, "DNS:Edit"),
            Capability::PagesWrite => write!(f, "Pages:Edit"),
            Capability::TunnelRead => write!(f, "Cloudflare Tunnel:Read"),
            Capability::TunnelWrite => write!(f, "Cloudflare Tunnel:Edit"),
            Capability::ListsWrite => write!(f, "Account Filter Lists:Edit"),
            Capability::CachePurge => write!(f, "Cache Purge"),
        }
    }
}

/// Render a capability set as `A, B`.
pub fn describe(capabilities: &[Capability]) -> String {
    capabilities
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_ids_are_valid_hex() {
        // Permission IDs should be 32-char hex strings
        let all = [
            Capability::DnsWrite,
            Capability::PagesWrite,
            Capability::TunnelRead,
            Capability::TunnelWrite,
            Capability::ListsWrite,
            Capability::CachePurge,
        ];

        for capability in all {
            let id = capability.permission_group_id();
            assert_eq!(id.len(), 32, "Permission ID should be 32 chars");
            assert!(id.chars().all(|c| c.is_ascii_hexdigit()),
                "Permission ID should be hex");
        }
    }

    #[test]
    fn test_describe_capabilities() {
        assert_eq!(
            describe(&[Capability::DnsWrite, Capability::CachePurge]),
            "DNS:Edit, Cache Purge"
        );
    }
}
