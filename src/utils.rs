use std::ffi::OsString;

use rand::rngs::StdRng;
use rand::SeedableRng;

/// Build the generator for one run. A fixed seed makes frame and sample
/// content reproducible; without one the generator is seeded from the OS.
pub fn make_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Rewrite the two-letter short flags `-vw` and `-vh` into their long forms
/// so clap doesn't read them as `-v -w` / `-v -h`.
pub fn normalize_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .map(|arg| {
            let Some(text) = arg.to_str() else {
                return arg;
            };
            for (short, long) in [("-vw", "--width"), ("-vh", "--height")] {
                if text == short {
                    return OsString::from(long);
                }
                let Some(rest) = text.strip_prefix(short) else {
                    continue;
                };
                if let Some(value) = rest.strip_prefix('=') {
                    return OsString::from(format!("{}={}", long, value));
                }
                // attached value, `-vw64`
                if !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()) {
                    return OsString::from(format!("{}={}", long, rest));
                }
            }
            arg
        })
        .collect()
}
