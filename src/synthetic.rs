use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::replace::ValueGenerator;

/// `[REDACTED:<label>]` for every entity.
pub struct PlaceholderGenerator;

impl ValueGenerator for PlaceholderGenerator {
    fn generate(&self, label: &str, _rng: &mut StdRng) -> String {
        placeholder(label)
    }
}

pub fn placeholder(label: &str) -> String {
    format!("[REDACTED:{label}]")
}

/// Realistic-looking values per label, falling back to a placeholder for labels
/// without a recipe.
pub struct SyntheticGenerator;

impl ValueGenerator for SyntheticGenerator {
    fn generate(&self, label: &str, rng: &mut StdRng) -> String {
        synthesize(label, rng).unwrap_or_else(|| placeholder(label))
    }

    fn adapts_case(&self) -> bool {
        true
    }
}

const FIRST_NAMES: &[&str] = &[
    "James", "Mary", "Robert", "Patricia", "Michael", "Linda", "David", "Elena", "Daniel", "Aisha",
    "Thomas", "Sofia", "Kevin", "Grace", "Marcus", "Nadia", "Owen", "Priya", "Samuel", "Chloe",
];

const LAST_NAMES: &[&str] = &[
    "Anderson", "Brooks", "Castillo", "Dawson", "Ellis", "Fischer", "Garcia", "Hughes", "Ibarra",
    "Jensen", "Kowalski", "Lindqvist", "Morales", "Novak", "Okafor", "Patel", "Quinn", "Reyes",
];

const STREETS: &[&str] = &[
    "Maple", "Oak", "Cedar", "Willow", "Lakeview", "Hillcrest", "Sunset", "Riverside", "Highland",
    "Park",
];

const STREET_SUFFIXES: &[&str] = &["St", "Ave", "Rd", "Blvd", "Ln", "Dr", "Ct"];

const CITIES: &[&str] = &[
    "Springfield", "Riverton", "Fairview", "Georgetown", "Salem", "Madison", "Ashland", "Clinton",
    "Franklin", "Greenville",
];

const STATES: &[&str] = &[
    "California", "Texas", "Oregon", "Ohio", "Georgia", "Colorado", "Virginia", "Michigan",
    "Arizona", "Maine",
];

const COUNTRIES: &[&str] = &[
    "Canada", "Portugal", "Kenya", "Norway", "Chile", "Vietnam", "Ireland", "New Zealand", "Poland",
    "Morocco",
];

const COMPANIES: &[&str] = &[
    "Northwind Traders", "Bluefield Group", "Harbor & Finch", "Crescent Labs", "Summit Partners",
    "Evergreen Holdings", "Ironbridge Systems", "Silverline Co",
];

const JOBS: &[&str] = &[
    "Accountant", "Civil Engineer", "Teacher", "Pharmacist", "Software Developer", "Electrician",
    "Paralegal", "Nurse",
];

const LANGUAGES: &[&str] = &["English", "Spanish", "French", "German", "Portuguese", "Tagalog"];

const MONTHS: &[&str] = &[
    "January", "February", "March", "April", "May", "June", "July", "August", "September",
    "October", "November", "December",
];

const FILE_WORDS: &[&str] = &["report", "summary", "notes", "invoice", "scan", "statement"];
const FILE_EXTS: &[&str] = &["pdf", "docx", "xlsx", "txt", "png"];
const EMAIL_DOMAINS: &[&str] = &["example.com", "example.org", "example.net"];

fn pick(rng: &mut StdRng, pool: &[&'static str]) -> &'static str {
    pool.choose(rng).copied().unwrap_or_default()
}

fn digits(rng: &mut StdRng, n: usize) -> String {
    (0..n)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

fn date(rng: &mut StdRng, years: std::ops::RangeInclusive<u32>) -> (u32, u32, u32) {
    (
        rng.gen_range(years),
        rng.gen_range(1..=12),
        rng.gen_range(1..=28),
    )
}

fn iso_date(rng: &mut StdRng) -> String {
    let (y, m, d) = date(rng, 1990..=2024);
    format!("{y:04}-{m:02}-{d:02}")
}

fn person(rng: &mut StdRng) -> String {
    format!("{} {}", pick(rng, FIRST_NAMES), pick(rng, LAST_NAMES))
}

fn street_address(rng: &mut StdRng) -> String {
    format!(
        "{} {} {}",
        rng.gen_range(10..=9999),
        pick(rng, STREETS),
        pick(rng, STREET_SUFFIXES)
    )
}

fn thousands(n: u32) -> String {
    let s = n.to_string();
    let mut out = String::with_capacity(s.len() + s.len() / 3);
    for (i, ch) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Whether a digit string passes the Luhn checksum.
pub fn luhn_valid(number: &str) -> bool {
    let digits: Vec<u32> = number.chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.len() < 12 {
        return false;
    }
    luhn_sum(&digits, false) % 10 == 0
}

fn luhn_sum(digits: &[u32], double_last: bool) -> u32 {
    digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, d)| {
            let double = (i % 2 == 0) == double_last;
            match (double, d * 2) {
                (true, v) if v > 9 => v - 9,
                (true, v) => v,
                (false, _) => *d,
            }
        })
        .sum()
}

fn card_number(rng: &mut StdRng) -> String {
    let mut body: Vec<u32> = vec![4];
    body.extend((0..14).map(|_| rng.gen_range(0..10)));
    let check = (10 - luhn_sum(&body, true) % 10) % 10;
    body.push(check);
    body.chunks(4)
        .map(|g| g.iter().map(|d| d.to_string()).collect::<String>())
        .collect::<Vec<_>>()
        .join("-")
}

fn synthesize(label: &str, rng: &mut StdRng) -> Option<String> {
    let v = match label {
        "name" => person(rng),
        "name given" => pick(rng, FIRST_NAMES).to_string(),
        "name family" => pick(rng, LAST_NAMES).to_string(),
        "name medical professional" => format!("Dr. {}", person(rng)),
        "email address" => format!(
            "{}.{}@{}",
            pick(rng, FIRST_NAMES).to_lowercase(),
            pick(rng, LAST_NAMES).to_lowercase(),
            pick(rng, EMAIL_DOMAINS)
        ),
        "phone number" => format!(
            "({}) {}-{}",
            rng.gen_range(201..=989),
            rng.gen_range(200..=999),
            digits(rng, 4)
        ),
        "ssn" => format!(
            "{:03}-{:02}-{:04}",
            rng.gen_range(100..=665),
            rng.gen_range(1..=99),
            rng.gen_range(1..=9999)
        ),
        "passport number" => format!(
            "{}{}",
            char::from(b'A' + rng.gen_range(0..26u8)),
            digits(rng, 8)
        ),
        "credit card" => card_number(rng),
        "credit card expiration" => {
            format!("{:02}/{:02}", rng.gen_range(1..=12), rng.gen_range(26..=33))
        }
        "cvv" => digits(rng, 3),
        "pin" => rng.gen_range(1000..=9999).to_string(),
        "account number" | "accounts" | "numerical pii" | "esidno" => digits(rng, 13),
        "confirmation number" => digits(rng, 8),
        "policy number" => format!("POL-{}", digits(rng, 8)),
        "password" => {
            const ALNUM: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz23456789";
            (0..12)
                .map(|_| char::from(ALNUM[rng.gen_range(0..ALNUM.len())]))
                .collect::<String>()
        }
        "date" | "discharge date" => iso_date(rng),
        "dob" => {
            let (y, m, d) = date(rng, 1940..=2005);
            format!("{m:02}/{d:02}/{y:04}")
        }
        "date interval" => format!("{} to {}", iso_date(rng), iso_date(rng)),
        "time" => format!(
            "{:02}:{:02}:{:02}",
            rng.gen_range(0..24),
            rng.gen_range(0..60),
            rng.gen_range(0..60)
        ),
        "month" => pick(rng, MONTHS).to_string(),
        "duration" => format!(
            "{} {}",
            rng.gen_range(1..=100),
            pick(rng, &["days", "weeks", "months"])
        ),
        "planduration" => format!("{} months", rng.gen_range(1..=36)),
        "age" => rng.gen_range(18..=90).to_string(),
        "gender" => pick(rng, &["Male", "Female", "Non-binary"]).to_string(),
        "marital status" => pick(rng, &["Single", "Married", "Divorced", "Widowed"]).to_string(),
        "physical attribute" => pick(rng, &["Tall", "Short", "Athletic", "Slender"]).to_string(),
        "condition" => pick(rng, &["Hypertension", "Diabetes", "Asthma", "Migraine"]).to_string(),
        "medical process" => pick(rng, &["Surgery", "X-Ray", "MRI", "Blood Test"]).to_string(),
        "test result" => pick(rng, &["Positive", "Negative", "Normal"]).to_string(),
        "location address street" => street_address(rng),
        "location address" | "address" => format!(
            "{}, {}, {} {}",
            street_address(rng),
            pick(rng, CITIES),
            pick(rng, STATES),
            digits(rng, 5)
        ),
        "location city" | "location" => pick(rng, CITIES).to_string(),
        "county" => format!("{} County", pick(rng, CITIES)),
        "location state" => pick(rng, STATES).to_string(),
        "location country" | "origin" => pick(rng, COUNTRIES).to_string(),
        "location zip" | "zip" => digits(rng, 5),
        "organization" => pick(rng, COMPANIES).to_string(),
        "organization medical facility" => format!("{} Hospital", pick(rng, CITIES)),
        "occupation" => pick(rng, JOBS).to_string(),
        "language" => pick(rng, LANGUAGES).to_string(),
        "filename" => format!("{}.{}", pick(rng, FILE_WORDS), pick(rng, FILE_EXTS)),
        "money" => format!("${}", thousands(rng.gen_range(100..=100_000))),
        "rate" => format!("{}%", rng.gen_range(1..=100)),
        "number" => rng.gen_range(1..=999_999).to_string(),
        _ => return None,
    };
    Some(v)
}
