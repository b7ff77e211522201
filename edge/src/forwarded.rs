use std::net::Ipv4Addr;

use cdn_proxy_common::network::ip::is_public_v4;
use rand::Rng;

/// Draws addresses until one is publicly routable. Non-public blocks cover
/// well under a fifth of the space, so this terminates after a couple of
/// draws on average.
pub fn random_public_ipv4<R: Rng + ?Sized>(rng: &mut R) -> Ipv4Addr {
    loop {
        let ip = Ipv4Addr::from(rng.random_range(1..=u32::MAX));
        if is_public_v4(ip) {
            return ip;
        }
    }
}

pub fn synthetic_forwarded_for() -> Ipv4Addr {
    random_public_ipv4(&mut rand::rng())
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_addresses_are_always_public() {
        for _ in 0..10_000 {
            let ip = synthetic_forwarded_for();
            assert!(is_public_v4(ip), "{ip} is not public");
        }
    }

    #[test]
    fn successive_addresses_differ() {
        let first = synthetic_forwarded_for();
        let differs: bool = (0..5).any(|_| synthetic_forwarded_for() != first);
        assert!(differs);
    }
}
