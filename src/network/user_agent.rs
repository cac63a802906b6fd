use rand::seq::SliceRandom;
use rand::Rng;

type Generator = fn(&mut rand::rngs::ThreadRng) -> String;

const DESKTOP: &[Generator] = &[windows_chrome, windows_firefox, macos_safari, linux_chrome];
const MOBILE: &[Generator] = &[ios_safari, android_chrome];

/// Returns a plausible modern browser User-Agent, desktop roughly two times
/// out of three.
pub fn random_user_agent() -> String {
    let mut rng = rand::thread_rng();
    let pool = if rng.gen_bool(0.35) { MOBILE } else { DESKTOP };
    match pool.choose(&mut rng) {
        Some(generate) => generate(&mut rng),
        None => windows_chrome(&mut rng),
    }
}

fn chrome_version(rng: &mut rand::rngs::ThreadRng) -> String {
    format!(
        "{}.0.{}.{}",
        rng.gen_range(120..=130),
        rng.gen_range(6000..=7100),
        rng.gen_range(10..=200)
    )
}

fn windows_chrome(rng: &mut rand::rngs::ThreadRng) -> String {
    format!(
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{} Safari/537.36",
        chrome_version(rng)
    )
}

fn windows_firefox(rng: &mut rand::rngs::ThreadRng) -> String {
    let ff = rng.gen_range(115..=131);
    format!("Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:{ff}.0) Gecko/20100101 Firefox/{ff}.0")
}

fn macos_safari(rng: &mut rand::rngs::ThreadRng) -> String {
    let mac = ["13_6_7", "14_5", "14_6", "15_0"].choose(rng).copied().unwrap_or("14_6");
    let safari = ["17.4", "17.5", "17.6", "18.0"].choose(rng).copied().unwrap_or("17.6");
    format!("Mozilla/5.0 (Macintosh; Intel Mac OS X {mac}) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/{safari} Safari/605.1.15")
}

fn linux_chrome(rng: &mut rand::rngs::ThreadRng) -> String {
    format!(
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{} Safari/537.36",
        chrome_version(rng)
    )
}

fn ios_safari(rng: &mut rand::rngs::ThreadRng) -> String {
    let ios = ["16_6", "17_4", "17_5", "17_6", "18_0"].choose(rng).copied().unwrap_or("17_5");
    let version = ios.replace('_', ".");
    format!("Mozilla/5.0 (iPhone; CPU iPhone OS {ios} like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/{version} Mobile/15E148 Safari/604.1")
}

fn android_chrome(rng: &mut rand::rngs::ThreadRng) -> String {
    let android = rng.gen_range(11..=14);
    let device = ["Pixel 7", "Pixel 8", "SM-S911B", "SM-G991B"]
        .choose(rng)
        .copied()
        .unwrap_or("Pixel 8");
    format!(
        "Mozilla/5.0 (Linux; Android {android}; {device}) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{} Mobile Safari/537.36",
        chrome_version(rng)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_browser_like_agents() {
        for _ in 0..32 {
            let ua = random_user_agent();
            assert!(ua.starts_with("Mozilla/5.0"), "unexpected UA: {ua}");
            assert!(ua.len() > 40, "UA too short: {ua}");
        }
    }
}
