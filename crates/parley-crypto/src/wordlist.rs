//! Embedded word list for minted identities.
//!
//! Identities read as `word-word-suffix@domain`, so the list holds
//! short, common, unambiguous English words. 256 entries keeps index
//! selection byte-aligned; combined with the four-byte random suffix
//! a single mint draws from 2^16 x 2^32 combinations.

/// Number of entries; a whole byte of index space.
pub const WORDLIST_LEN: usize = 256;

/// The word list, sorted, ASCII-lowercase.
pub const WORDLIST: [&str; WORDLIST_LEN] = [
    "acorn", "alarm", "amber", "anchor", "anvil", "apple", "apron", "arrow", "atlas", "attic",
    "badge", "bagel", "baker", "bamboo", "banjo", "barn", "basil", "basket", "beach", "beacon",
    "bell", "bench", "berry", "birch", "bison", "blade", "bloom", "bolt", "book", "boot",
    "bottle", "bread", "breeze", "brick", "bridge", "brook", "broom", "bugle", "button", "cabin",
    "cable", "cactus", "candle", "canoe", "canyon", "carbon", "cargo", "carrot", "castle", "cedar",
    "cellar", "chalk", "cherry", "chisel", "cider", "cinder", "circle", "citrus", "clay", "cliff",
    "clock", "cloud", "clover", "cobalt", "cocoa", "comet", "copper", "coral", "cotton", "cradle",
    "crane", "crater", "crayon", "creek", "cricket", "crow", "crystal", "cumin", "curtain", "cycle",
    "daisy", "deck", "delta", "denim", "desk", "dome", "door", "dragon", "drift", "drum",
    "dune", "eagle", "easel", "echo", "elm", "ember", "engine", "fable", "falcon", "feather",
    "fern", "fiddle", "field", "flint", "flute", "forest", "fossil", "fox", "frost", "garden",
    "garlic", "gate", "gecko", "geyser", "ginger", "glacier", "glade", "goblet", "goose", "granite",
    "grape", "gravel", "grove", "hammer", "harbor", "harp", "hazel", "heron", "hill", "hinge",
    "honey", "hook", "horizon", "ice", "ink", "iris", "iron", "island", "ivory", "jade",
    "jasper", "jigsaw", "jungle", "juniper", "kayak", "kettle", "kiln", "kite", "knoll", "ladder",
    "lagoon", "lake", "lantern", "lark", "laurel", "lava", "ledge", "lemon", "lentil", "lilac",
    "lily", "linen", "lotus", "lumber", "mango", "maple", "marble", "meadow", "mesa", "mint",
    "mirror", "mole", "moose", "morning", "moss", "moth", "mountain", "mural", "needle", "nest",
    "north", "nutmeg", "oak", "oasis", "ocean", "olive", "onion", "opal", "orange", "orchard",
    "otter", "owl", "paddle", "palm", "panda", "pantry", "paper", "parsley", "peach", "pebble",
    "pencil", "pepper", "petal", "piano", "pillow", "pine", "pistachio", "plank", "plum", "pond",
    "poplar", "prairie", "prism", "pumpkin", "quartz", "quill", "quilt", "rabbit", "raft", "rain",
    "raven", "reef", "ribbon", "ridge", "river", "robin", "rocket", "rope", "rose", "rye",
    "saddle", "saffron", "sage", "salmon", "sand", "satchel", "seed", "shade", "shell", "shore",
    "silver", "sketch", "slate", "snow", "spark", "spruce", "squash", "stone", "stream", "summit",
    "sunset", "thistle", "timber", "trail", "tulip", "valley",
];
