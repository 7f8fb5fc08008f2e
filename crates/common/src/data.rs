//! Random test data
//!
//! Only enough generation to keep provisioned records unique and readable.

use rand::distributions::Alphanumeric;
use rand::seq::SliceRandom;
use rand::Rng;

const WORDS: &[&str] = &[
    "lorem", "ipsum", "dolor", "sit", "amet", "consectetur", "adipiscing", "elit", "sed",
    "do", "eiusmod", "tempor", "incididunt", "ut", "labore", "et", "dolore", "magna",
    "aliqua", "enim", "minim", "veniam", "quis", "nostrud", "exercitation", "ullamco",
    "laboris", "nisi", "aliquip", "commodo", "consequat",
];

/// Random alphanumeric identifier of `len` characters
pub fn nanoid(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// `user_<nanoid>`
pub fn unique_username() -> String {
    format!("user_{}", nanoid(8))
}

/// Capitalized sentence of `words` words ending in a period
pub fn sentence(words: usize) -> String {
    let mut rng = rand::thread_rng();
    let mut text = (0..words.max(1))
        .filter_map(|_| WORDS.choose(&mut rng).copied())
        .collect::<Vec<_>>()
        .join(" ");

    if let Some(first) = text.get(0..1) {
        let upper = first.to_uppercase();
        text.replace_range(0..1, &upper);
    }
    text.push('.');
    text
}

/// `count` paragraphs separated by blank lines
pub fn paragraphs(count: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..count.max(1))
        .map(|_| {
            let sentences = rng.gen_range(3..6);
            (0..sentences)
                .map(|_| sentence(rng.gen_range(5..12)))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
