//! Network-related constants.

/// Default port for the kubesim HTTP stub.
pub const DEFAULT_API_PORT: u16 = 6443;

/// First two octets of synthetic service cluster IPs (`10.96.x.y`).
pub const SERVICE_CIDR_PREFIX: [u8; 2] = [10, 96];

/// The `kubernetes` service always gets the first service address.
pub const KUBERNETES_SERVICE_IP: &str = "10.96.0.1";

/// First two octets of synthetic pod IPs (`10.244.x.y`).
pub const POD_CIDR_PREFIX: [u8; 2] = [10, 244];

/// First three octets of simulated node host IPs (`192.168.49.n`).
pub const NODE_SUBNET_PREFIX: [u8; 3] = [192, 168, 49];

/// Bridge network used by the container engine (`172.17.0.n`).
pub const BRIDGE_SUBNET_PREFIX: [u8; 3] = [172, 17, 0];

/// Gateway of the bridge network.
pub const BRIDGE_GATEWAY: &str = "172.17.0.1";

/// Name of the default container network.
pub const BRIDGE_NETWORK: &str = "bridge";

/// Documentation range (RFC 5737) used for load balancer ingress addresses.
pub const LOAD_BALANCER_SUBNET_PREFIX: [u8; 3] = [203, 0, 113];

/// Inclusive NodePort allocation range.
pub const NODE_PORT_RANGE: (u16, u16) = (30000, 32767);
