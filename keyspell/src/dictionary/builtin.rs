//! Last-resort word lists used when no dictionary asset can be loaded.

/// Common English words with rough corpus frequencies.
const ENGLISH: &[(&str, u64)] = &[
    ("the", 23_135_851_162),
    ("of", 13_151_942_776),
    ("and", 12_997_637_966),
    ("to", 12_136_980_858),
    ("a", 9_081_174_698),
    ("in", 8_469_404_971),
    ("for", 5_933_321_709),
    ("is", 4_705_743_816),
    ("on", 3_750_423_199),
    ("that", 3_400_031_103),
    ("by", 3_350_048_871),
    ("this", 3_228_469_771),
    ("with", 3_183_110_675),
    ("i", 3_086_225_277),
    ("you", 2_996_181_025),
    ("it", 2_813_163_874),
    ("not", 2_633_487_141),
    ("or", 2_590_739_907),
    ("be", 2_398_724_162),
    ("are", 2_393_614_870),
    ("from", 2_275_595_356),
    ("at", 2_272_272_772),
    ("as", 2_247_431_740),
    ("your", 2_062_066_547),
    ("all", 2_022_459_848),
    ("have", 1_564_202_750),
    ("new", 1_551_258_643),
    ("more", 1_544_771_673),
    ("was", 1_463_007_706),
    ("we", 1_413_301_442),
    ("will", 1_402_911_244),
    ("home", 1_391_893_098),
    ("can", 1_367_262_810),
    ("about", 1_338_403_580),
    ("if", 1_282_493_843),
    ("page", 1_222_834_398),
    ("my", 1_214_914_262),
    ("has", 1_173_034_009),
    ("search", 1_147_059_163),
    ("free", 1_143_917_316),
    ("but", 1_073_497_233),
    ("our", 1_050_836_930),
    ("one", 1_036_601_466),
    ("other", 978_481_319),
    ("do", 950_751_722),
    ("no", 937_112_320),
    ("information", 875_076_600),
    ("time", 829_987_049),
    ("they", 769_802_318),
    ("there", 677_523_024),
    ("what", 668_768_209),
    ("when", 657_226_064),
    ("would", 553_547_069),
    ("people", 510_366_741),
    ("know", 504_524_817),
    ("just", 491_573_025),
    ("good", 465_015_718),
    ("think", 302_419_104),
    ("thanks", 290_178_484),
    ("hello", 205_428_937),
    ("please", 180_532_118),
    ("don't", 138_226_741),
    ("can't", 68_346_287),
    ("i'm", 96_714_226),
    ("it's", 224_562_106),
    ("tomorrow", 34_672_508),
    ("today", 271_224_112),
    ("yes", 154_012_245),
];

/// The built-in list for `primary_language`, or an empty list.
pub(super) fn entries_for(primary_language: &str) -> &'static [(&'static str, u64)] {
    match primary_language {
        "en" => ENGLISH,
        _ => &[],
    }
}
