//! Bone auto-detection for common character rig naming schemes.

/// Bones the tracker can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoneRole {
    Head,
    Neck,
}

/// Case-insensitive bone name pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BonePattern {
    Exact(&'static str),
    Contains(&'static str),
}

impl BonePattern {
    pub fn matches(&self, bone: &str) -> bool {
        let bone = bone.to_lowercase();
        match self {
            BonePattern::Exact(p) => bone == *p,
            BonePattern::Contains(p) => bone.contains(p),
        }
    }
}

// Patterns are lowercase, highest priority first.
const HEAD_PATTERNS: [BonePattern; 7] = [
    BonePattern::Contains("c_headx"),      // Auto-Rig Pro control
    BonePattern::Contains("headx"),        // Auto-Rig Pro deform
    BonePattern::Contains("mixamorig:head"),
    BonePattern::Contains("def-spine.006"), // Rigify
    BonePattern::Contains("def-head"),
    BonePattern::Exact("head"),
    BonePattern::Contains("head"),
];

const NECK_PATTERNS: [BonePattern; 7] = [
    BonePattern::Contains("c_neckx"),
    BonePattern::Contains("neckx"),
    BonePattern::Contains("mixamorig:neck"),
    BonePattern::Contains("def-spine.004"),
    BonePattern::Contains("def-neck"),
    BonePattern::Exact("neck"),
    BonePattern::Contains("neck"),
];

impl BoneRole {
    pub fn patterns(&self) -> &'static [BonePattern] {
        match self {
            BoneRole::Head => &HEAD_PATTERNS,
            BoneRole::Neck => &NECK_PATTERNS,
        }
    }
}

/// Best bone for `role`: the first pattern, in priority order, that any
/// bone matches. Among bones matching the same pattern, list order wins.
pub fn find_best_match<'a, S: AsRef<str>>(bones: &'a [S], role: BoneRole) -> Option<&'a str> {
    role.patterns().iter().find_map(|pattern| {
        bones
            .iter()
            .map(|b| AsRef::<str>::as_ref(b))
            .find(|bone| pattern.matches(bone))
    })
}

/// Bones whose name contains `term`, case-insensitively.
pub fn filter_bones<'a, S: AsRef<str>>(bones: &'a [S], term: &str) -> Vec<&'a str> {
    let term = term.to_lowercase();
    bones
        .iter()
        .map(|b| AsRef::<str>::as_ref(b))
        .filter(|bone| bone.to_lowercase().contains(&term))
        .collect()
}
