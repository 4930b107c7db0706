//! NCERT curriculum references
//!
//! Fixed table of textbooks and topic→chapter mappings. Lookups produce
//! ncert.nic.in links without calling any remote service.

use serde::Serialize;

const BASE_URL: &str = "https://ncert.nic.in";

/// One textbook for a (subject, class) pair
#[derive(Debug, Clone, Copy)]
pub struct Textbook {
    pub subject: &'static str,
    pub grade: u32,
    pub code: &'static str,
    pub name: &'static str,
    pub chapters: u32,
}

const fn book(subject: &'static str, grade: u32, code: &'static str, name: &'static str, chapters: u32) -> Textbook {
    Textbook {
        subject,
        grade,
        code,
        name,
        chapters,
    }
}

pub const TEXTBOOKS: &[Textbook] = &[
    book("mathematics", 1, "aemh1", "Math-Magic Book 1", 13),
    book("mathematics", 2, "bemh1", "Math-Magic Book 2", 15),
    book("mathematics", 3, "cemh1", "Math-Magic Book 3", 14),
    book("mathematics", 4, "demh1", "Math-Magic Book 4", 14),
    book("mathematics", 5, "eemh1", "Math-Magic Book 5", 14),
    book("mathematics", 6, "femh1", "Mathematics Class 6", 14),
    book("mathematics", 7, "gemh1", "Mathematics Class 7", 15),
    book("mathematics", 8, "hemh1", "Mathematics Class 8", 16),
    book("mathematics", 9, "iemh1", "Mathematics Class 9", 15),
    book("mathematics", 10, "jemh1", "Mathematics Class 10", 15),
    book("science", 6, "fesc1", "Science Class 6", 16),
    book("science", 7, "gesc1", "Science Class 7", 18),
    book("science", 8, "hesc1", "Science Class 8", 18),
    book("science", 9, "iesc1", "Science Class 9", 15),
    book("science", 10, "jesc1", "Science Class 10", 16),
    book("english", 1, "aeen1", "Marigold Class 1", 10),
    book("english", 3, "ceen1", "Marigold Class 3", 10),
    book("english", 5, "eeen1", "Marigold Class 5", 10),
    book("english", 6, "fehl1", "Honeysuckle Class 6", 10),
    book("english", 8, "hehd1", "Honeydew Class 8", 10),
    book("english", 10, "jeff1", "First Flight Class 10", 11),
    book("hindi", 1, "ahhn1", "Rimjhim Class 1", 23),
    book("hindi", 5, "ehhn1", "Rimjhim Class 5", 18),
    book("hindi", 6, "fhvs1", "Vasant Class 6", 17),
    book("hindi", 10, "jhks1", "Kshitij Class 10", 17),
    book("social_science", 6, "fess1", "History - Our Pasts I", 12),
    book("social_science", 7, "gess1", "History - Our Pasts II", 10),
    book("social_science", 8, "hess1", "History - Our Pasts III", 12),
    book("social_science", 9, "iess1", "History - India and Contemporary World I", 8),
    book("social_science", 10, "jess3", "History - India and Contemporary World II", 8),
];

/// (topic, subject, grade, chapter)
const TOPIC_CHAPTERS: &[(&str, &str, u32, u32)] = &[
    ("fractions", "mathematics", 5, 4),
    ("fractions", "mathematics", 6, 7),
    ("fractions", "mathematics", 7, 2),
    ("decimals", "mathematics", 5, 10),
    ("decimals", "mathematics", 6, 8),
    ("decimals", "mathematics", 7, 2),
    ("algebra", "mathematics", 6, 11),
    ("algebra", "mathematics", 7, 12),
    ("algebra", "mathematics", 8, 9),
    ("geometry", "mathematics", 6, 4),
    ("geometry", "mathematics", 7, 6),
    ("geometry", "mathematics", 8, 3),
    ("photosynthesis", "science", 7, 1),
    ("photosynthesis", "science", 10, 6),
    ("cells", "science", 8, 8),
    ("cells", "science", 9, 5),
    ("motion", "science", 9, 8),
    ("force", "science", 8, 11),
    ("force", "science", 9, 9),
    ("electricity", "science", 10, 12),
    ("chemical_reactions", "science", 10, 1),
];

/// Reference passages indexed for retrieval at startup
pub const CHAPTER_NOTES: &[(&str, u32, &str, &str)] = &[
    (
        "Mathematics",
        5,
        "Parts and Wholes",
        "Fractions as equal parts of a whole. Halves, quarters and thirds using paper folding, \
         roti and chapati sharing. Comparing fractions with drawings. Learning objective: \
         students represent fractions with objects and pictures before symbols.",
    ),
    (
        "Mathematics",
        6,
        "Fractions",
        "Proper, improper and mixed fractions. Equivalent fractions on the number line. \
         Adding and subtracting like and unlike fractions. Learning objective: students \
         find equivalent fractions and compare fractions using common denominators.",
    ),
    (
        "Mathematics",
        6,
        "Decimals",
        "Tenths and hundredths, place value of decimals, money and length as decimals. \
         Learning objective: students convert fractions with denominator 10 or 100 to decimals.",
    ),
    (
        "Mathematics",
        7,
        "Simple Equations",
        "Setting up equations from puzzles, solving by balancing both sides, transposition. \
         Learning objective: students form and solve linear equations in one variable.",
    ),
    (
        "Mathematics",
        6,
        "Basic Geometrical Ideas",
        "Points, lines, line segments, rays, angles, triangles and circles found in the classroom \
         and school ground. Learning objective: students identify and draw basic shapes.",
    ),
    (
        "Mathematics",
        3,
        "Give and Take",
        "Addition and subtraction with carrying and borrowing using bundles of sticks and \
         place value cards. Learning objective: students add and subtract two and three digit numbers.",
    ),
    (
        "Mathematics",
        4,
        "Tick Tick Tick",
        "Reading a clock, hours and minutes, daily routines and time intervals. Learning \
         objective: students read time and compute simple durations.",
    ),
    (
        "Science",
        7,
        "Nutrition in Plants",
        "Photosynthesis in green leaves, role of chlorophyll, sunlight, water and carbon \
         dioxide. Starch test with iodine. Learning objective: students explain how plants make food.",
    ),
    (
        "Science",
        8,
        "Cell Structure and Functions",
        "Cells as building blocks, onion peel observation, plant and animal cells, nucleus \
         and cell membrane. Learning objective: students draw and label cells.",
    ),
    (
        "Science",
        8,
        "Force and Pressure",
        "Push and pull, contact and non-contact forces, pressure in liquids and air. \
         Learning objective: students relate force to change in motion.",
    ),
    (
        "Science",
        10,
        "Electricity",
        "Electric current, potential difference, Ohm's law, resistance, series and parallel \
         circuits. Learning objective: students build simple circuits and calculate resistance.",
    ),
    (
        "Science",
        6,
        "Components of Food",
        "Nutrients in food, carbohydrates, proteins, fats, vitamins and minerals, balanced diet \
         using local meals. Learning objective: students test food for starch and classify nutrients.",
    ),
    (
        "English",
        3,
        "Reading with Marigold",
        "Phonics, sight words, reading aloud short poems and stories, picture-based \
         conversation. Learning objective: students read simple sentences with understanding.",
    ),
    (
        "Hindi",
        1,
        "Rimjhim Varnamala",
        "Varnamala, matras, joining letters into words, rhymes and story reading. Learning \
         objective: students recognise letters and read simple words.",
    ),
    (
        "Social Studies",
        6,
        "What, Where, How and When",
        "Sources of history, manuscripts, inscriptions, archaeology and timelines. Learning \
         objective: students place events on a timeline.",
    ),
];

/// Resolved reference for a subject/class and optional topic
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NcertReference {
    pub subject: &'static str,
    pub grade: u32,
    pub book_name: &'static str,
    pub book_code: &'static str,
    pub total_chapters: u32,
    pub chapter: Option<u32>,
    pub chapter_list_url: String,
    pub textbook_url: String,
    pub pdf_url: Option<String>,
}

/// Normalise a free-form subject name to a textbook subject key
pub fn normalize_subject(subject: &str) -> String {
    let key = subject.trim().to_lowercase().replace(' ', "_");
    match key.as_str() {
        "maths" | "math" | "ganit" => "mathematics".to_string(),
        "social" | "sst" | "social_studies" | "history" | "geography" | "civics" => {
            "social_science".to_string()
        }
        "evs" => "science".to_string(),
        _ => key,
    }
}

pub fn find_textbook(subject: &str, grade: u32) -> Option<&'static Textbook> {
    let subject = normalize_subject(subject);
    TEXTBOOKS
        .iter()
        .find(|b| b.subject == subject && b.grade == grade)
}

/// Chapter number for a topic; falls back to partial topic matches
pub fn chapter_for_topic(topic: &str, subject: &str, grade: u32) -> Option<u32> {
    let topic = topic.trim().to_lowercase().replace(' ', "_");
    let subject = normalize_subject(subject);
    let matches = |t: &str| t == topic || t.contains(topic.as_str()) || topic.contains(t);

    TOPIC_CHAPTERS
        .iter()
        .find(|(t, s, g, _)| *t == topic && *s == subject && *g == grade)
        .or_else(|| {
            TOPIC_CHAPTERS
                .iter()
                .find(|(t, s, g, _)| matches(t) && *s == subject && *g == grade)
        })
        .map(|(_, _, _, chapter)| *chapter)
}

pub fn lookup(subject: &str, grade: u32, topic: Option<&str>) -> Option<NcertReference> {
    let book = find_textbook(subject, grade)?;
    let chapter = topic
        .and_then(|t| chapter_for_topic(t, subject, grade))
        .filter(|c| (1..=book.chapters).contains(c));

    let chapter_list_url = format!("{}/textbook.php?{}=0", BASE_URL, book.code);
    let (textbook_url, pdf_url) = match chapter {
        Some(c) => (
            format!("{}/textbook.php?{}={}", BASE_URL, book.code, c),
            Some(format!("{}/textbook/pdf/{}{:02}.pdf", BASE_URL, book.code, c)),
        ),
        None => (chapter_list_url.clone(), None),
    };

    Some(NcertReference {
        subject: book.subject,
        grade: book.grade,
        book_name: book.name,
        book_code: book.code,
        total_chapters: book.chapters,
        chapter,
        chapter_list_url,
        textbook_url,
        pdf_url,
    })
}

/// Search the textbook table; any missing filter matches everything
pub fn search(subject: Option<&str>, grade: Option<u32>, topic: Option<&str>) -> Vec<NcertReference> {
    let subject = subject.map(normalize_subject);
    TEXTBOOKS
        .iter()
        .filter(|b| subject.as_deref().map_or(true, |s| b.subject == s))
        .filter(|b| grade.map_or(true, |g| b.grade == g))
        .filter_map(|b| lookup(b.subject, b.grade, topic))
        .filter(|r| topic.is_none() || r.chapter.is_some())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_with_topic_chapter() {
        let r = lookup("Maths", 6, Some("Fractions")).unwrap();
        assert_eq!(r.book_name, "Mathematics Class 6");
        assert_eq!(r.chapter, Some(7));
        assert_eq!(r.textbook_url, "https://ncert.nic.in/textbook.php?femh1=7");
        assert_eq!(
            r.pdf_url.as_deref(),
            Some("https://ncert.nic.in/textbook/pdf/femh107.pdf")
        );
    }

    #[test]
    fn test_lookup_without_chapter_links_to_list() {
        let r = lookup("Science", 9, None).unwrap();
        assert_eq!(r.chapter, None);
        assert_eq!(r.textbook_url, r.chapter_list_url);
        assert!(r.pdf_url.is_none());
    }

    #[test]
    fn test_unknown_book() {
        assert!(lookup("Physics", 3, None).is_none());
        assert!(lookup("Kannada", 5, None).is_none());
    }

    #[test]
    fn test_subject_aliases() {
        assert_eq!(normalize_subject("Social Studies"), "social_science");
        assert_eq!(normalize_subject("ganit"), "mathematics");
        assert_eq!(normalize_subject("Science"), "science");
    }

    #[test]
    fn test_partial_topic_match() {
        assert_eq!(chapter_for_topic("chemical reactions", "science", 10), Some(1));
        assert_eq!(chapter_for_topic("fraction", "mathematics", 5), Some(4));
        assert_eq!(chapter_for_topic("poetry", "english", 5), None);
    }

    #[test]
    fn test_search_filters() {
        let maths = search(Some("mathematics"), None, None);
        assert_eq!(maths.len(), 10);

        let fractions = search(None, None, Some("fractions"));
        let grades: Vec<u32> = fractions.iter().map(|r| r.grade).collect();
        assert_eq!(grades, vec![5, 6, 7]);
    }
}
