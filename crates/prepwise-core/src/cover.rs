//! Cover images attached to newly generated interviews.

use rand::seq::IndexedRandom;

pub const INTERVIEW_COVERS: &[&str] = &[
    "/adobe.png",
    "/amazon.png",
    "/facebook.png",
    "/hostinger.png",
    "/pinterest.png",
    "/quora.png",
    "/reddit.png",
    "/skype.png",
    "/spotify.png",
    "/telegram.png",
    "/tiktok.png",
    "/yahoo.png",
];

/// Pick a random cover path under `/covers`.
pub fn random_interview_cover() -> String {
    let cover = INTERVIEW_COVERS
        .choose(&mut rand::rng())
        .copied()
        .unwrap_or("/adobe.png");
    format!("/covers{cover}")
}
