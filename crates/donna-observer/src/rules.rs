//! The reference rule table: regular expressions grouped into nineteen
//! categories, each carrying a signal label and optional severity, valence,
//! strength, or confidence. Compiled once per observer; matching is
//! case-insensitive.

use regex::Regex;

use crate::signals::SignalBundle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Health,
    Family,
    Emotion,
    Safety,
    Social,
    Activity,
    TimeReference,
    Environment,
    Adl,
    Cognitive,
    HelpRequest,
    EndOfLife,
    Hydration,
    Transportation,
    News,
    Goodbye,
    Question,
    Engagement,
    Acknowledgment,
}

impl Category {
    /// The bracketed tag used in injected guidance lines.
    pub fn tag(&self) -> &'static str {
        match self {
            Category::Health => "HEALTH",
            Category::Family => "FAMILY",
            Category::Emotion => "EMOTION",
            Category::Safety => "SAFETY",
            Category::Social => "SOCIAL",
            Category::Activity => "ACTIVITY",
            Category::TimeReference => "TIME",
            Category::Environment => "ENVIRONMENT",
            Category::Adl => "ADL",
            Category::Cognitive => "COGNITIVE",
            Category::HelpRequest => "HELP",
            Category::EndOfLife => "END OF LIFE",
            Category::Hydration => "HYDRATION",
            Category::Transportation => "TRANSPORT",
            Category::News => "NEWS",
            Category::Goodbye => "GOODBYE",
            Category::Question => "QUESTION",
            Category::Engagement => "ENGAGEMENT",
            Category::Acknowledgment => "ACKNOWLEDGMENT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Valence {
    Positive,
    Negative,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Intensity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strength {
    Weak,
    Strong,
}

#[derive(Debug)]
pub struct Rule {
    pub category: Category,
    pub signal: &'static str,
    pub pattern: &'static str,
    pub severity: Option<Severity>,
    pub valence: Option<Valence>,
    pub intensity: Option<Intensity>,
    pub strength: Option<Strength>,
    pub confidence: f64,
}

const fn rule(category: Category, signal: &'static str, pattern: &'static str) -> Rule {
    Rule {
        category,
        signal,
        pattern,
        severity: None,
        valence: None,
        intensity: None,
        strength: None,
        confidence: 0.8,
    }
}

const fn sev(
    category: Category,
    signal: &'static str,
    pattern: &'static str,
    severity: Severity,
) -> Rule {
    Rule {
        category,
        signal,
        pattern,
        severity: Some(severity),
        valence: None,
        intensity: None,
        strength: None,
        confidence: 0.8,
    }
}

const fn emo(
    signal: &'static str,
    pattern: &'static str,
    valence: Valence,
    intensity: Intensity,
) -> Rule {
    Rule {
        category: Category::Emotion,
        signal,
        pattern,
        severity: None,
        valence: Some(valence),
        intensity: Some(intensity),
        strength: None,
        confidence: 0.8,
    }
}

const fn bye(signal: &'static str, pattern: &'static str, strength: Strength) -> Rule {
    Rule {
        category: Category::Goodbye,
        signal,
        pattern,
        severity: None,
        valence: None,
        intensity: None,
        strength: Some(strength),
        confidence: 0.8,
    }
}

const fn ack(signal: &'static str, pattern: &'static str, confidence: f64) -> Rule {
    Rule {
        category: Category::Acknowledgment,
        signal,
        pattern,
        severity: None,
        valence: None,
        intensity: None,
        strength: None,
        confidence,
    }
}

/// The reference rule-set.
pub static RULES: &[Rule] = &[
    // ── HEALTH ────────────────────────────────────────────────────────────
    sev(Category::Health, "chest_pain", r"chest (pain|hurts|tight|pressure)", Severity::High),
    sev(Category::Health, "breathing", r"(can't|cannot|hard to|trouble) breath", Severity::High),
    sev(Category::Health, "dizzy", r"\b(dizzy|lightheaded|light-headed|vertigo)\b", Severity::High),
    sev(Category::Health, "numbness", r"\b(numb|tingling)\b", Severity::High),
    sev(Category::Health, "vision", r"(blurry|double|losing my) (vision|sight)|can't see", Severity::High),
    sev(Category::Health, "bleeding", r"\bbleed(ing)?\b", Severity::High),
    sev(Category::Health, "heart", r"heart (racing|pounding|flutter|skipping)", Severity::High),
    sev(Category::Health, "pain_strong", r"(terrible|awful|severe|unbearable|worst) (pain|ache)", Severity::High),
    sev(Category::Health, "nausea", r"\b(nausea|nauseous|throwing up|vomit)", Severity::Medium),
    sev(Category::Health, "pain", r"\b(pain|aches?|aching|hurts?|sore|throbbing)\b", Severity::Medium),
    sev(Category::Health, "headache", r"\b(headache|migraine)\b", Severity::Medium),
    sev(Category::Health, "swelling", r"\b(swollen|swelling)\b", Severity::Medium),
    sev(Category::Health, "fever", r"\b(fever|feverish|chills)\b", Severity::Medium),
    sev(Category::Health, "blood_pressure", r"blood pressure", Severity::Medium),
    sev(Category::Health, "medication_issue", r"(side effect|makes me feel (funny|strange|weird))", Severity::Medium),
    sev(Category::Health, "missed_meds", r"(forgot|missed|skipped) (my|the|to take).{0,20}(pill|medication|medicine|dose)", Severity::Medium),
    sev(Category::Health, "appointment", r"(doctor|dentist|clinic|hospital) (appointment|visit)", Severity::Low),
    sev(Category::Health, "tired_physical", r"(no energy|so tired|exhausted|worn out)", Severity::Low),
    sev(Category::Health, "sleep_trouble", r"(couldn't sleep|can't sleep|up all night|insomnia)", Severity::Low),
    sev(Category::Health, "weight", r"(losing|lost) weight|no appetite|not (been )?eating", Severity::Medium),
    sev(Category::Health, "incontinence", r"(accident(s)? at night|bladder trouble|can't hold it)", Severity::Medium),
    sev(Category::Health, "hearing", r"(can't hear|hearing aid|going deaf|speak up)", Severity::Low),
    sev(Category::Health, "dental", r"(tooth(ache)?|dentures?|gums? (hurt|bleed))", Severity::Low),
    sev(Category::Health, "skin", r"(rash|bruise[ds]?|itch(y|ing)|bed sores?)", Severity::Medium),
    sev(Category::Health, "cold_flu", r"\b(a cold|the flu|coughing|congested|sniffles)\b", Severity::Low),
    sev(Category::Health, "new_prescription", r"(new (pill|medication|prescription)|changed my (dose|medication))", Severity::Medium),
    sev(Category::Health, "pharmacy", r"(pharmacy|refill|prescription ready)", Severity::Low),
    sev(Category::Health, "test_results", r"(test results|blood work|waiting to hear from the doctor)", Severity::Medium),
    sev(Category::Health, "fell_asleep_day", r"(dozed|nodding) off|slept (all|most of the) day", Severity::Low),
    sev(Category::Health, "constipation", r"(constipat|stomach (trouble|upset)|indigestion|heartburn)", Severity::Low),

    // ── FAMILY ────────────────────────────────────────────────────────────
    rule(Category::Family, "grandchildren", r"\b(grandson|granddaughter|grandkids?|grandchild(ren)?)\b"),
    rule(Category::Family, "children", r"\bmy (son|daughter|kids?|children)\b"),
    rule(Category::Family, "spouse", r"\bmy (husband|wife|partner)\b"),
    rule(Category::Family, "siblings", r"\bmy (brother|sister)\b"),
    rule(Category::Family, "visit", r"(came|coming) (by|over|to visit)|visited me"),
    rule(Category::Family, "call_from_family", r"(called me|phoned me|heard from) .{0,20}\b(son|daughter|sister|brother|grand)"),
    rule(Category::Family, "family_event", r"\b(birthday|anniversary|wedding|graduation|christening|baptism)\b"),
    rule(Category::Family, "missing_family", r"(miss|haven't (seen|heard from)) .{0,25}\b(son|daughter|family|grandkids?|grandchildren)\b"),
    rule(Category::Family, "new_baby", r"(new baby|expecting|pregnant|great.grand)"),
    rule(Category::Family, "family_trouble", r"(worried about|trouble with|argument with) .{0,20}\b(son|daughter|family)\b"),
    rule(Category::Family, "in_laws", r"\bmy (son-in-law|daughter-in-law)\b"),
    rule(Category::Family, "cousins", r"\bmy (cousin|aunt|uncle)\b"),
    rule(Category::Family, "photos", r"(pictures?|photos?) of (the|my) (kids|family|grandkids)"),
    rule(Category::Family, "planned_visit", r"(coming (for|at)|visiting (for|at)) (christmas|thanksgiving|easter|the holidays|the weekend)"),
    rule(Category::Family, "helping_family", r"(babysat|watching|looked after) .{0,20}(grandkids?|grandchildren|the baby)"),

    // ── EMOTION ───────────────────────────────────────────────────────────
    emo("lonely", r"\b(lonely|alone all|no one (comes|visits|calls))\b", Valence::Negative, Intensity::High),
    emo("hopeless", r"(what's the point|no point|hopeless|give up)", Valence::Negative, Intensity::High),
    emo("crying", r"(crying|been in tears|teared up)", Valence::Negative, Intensity::High),
    emo("depressed", r"\b(depressed|depressing|miserable)\b", Valence::Negative, Intensity::High),
    emo("scared", r"\b(scared|frightened|terrified|afraid)\b", Valence::Negative, Intensity::High),
    emo("anxious", r"\b(anxious|anxiety|panicky|on edge)\b", Valence::Negative, Intensity::Medium),
    emo("sad", r"\b(sad|blue|down lately|heavy.hearted)\b", Valence::Negative, Intensity::Medium),
    emo("worried", r"\b(worried|worrying|worries me)\b", Valence::Negative, Intensity::Medium),
    emo("frustrated", r"\b(frustrated|fed up|sick of)\b", Valence::Negative, Intensity::Medium),
    emo("angry", r"\b(angry|furious|mad at)\b", Valence::Negative, Intensity::Medium),
    emo("bored", r"\b(bored|nothing to do|dull)\b", Valence::Negative, Intensity::Low),
    emo("grief", r"(passed away|funeral|since .{0,15}died|lost my)", Valence::Negative, Intensity::High),
    emo("happy", r"\b(happy|wonderful|delighted|thrilled|lovely day)\b", Valence::Positive, Intensity::Medium),
    emo("grateful", r"\b(grateful|thankful|blessed)\b", Valence::Positive, Intensity::Medium),
    emo("excited", r"\b(excited|can't wait|looking forward)\b", Valence::Positive, Intensity::Medium),
    emo("proud", r"\bso proud\b", Valence::Positive, Intensity::Medium),
    emo("content", r"\b(content|peaceful|at ease|pretty good)\b", Valence::Positive, Intensity::Low),
    emo("overwhelmed", r"\b(overwhelmed|too much for me|can't cope)\b", Valence::Negative, Intensity::High),
    emo("embarrassed", r"\b(embarrassed|ashamed|humiliat)", Valence::Negative, Intensity::Medium),
    emo("guilty", r"(feel (bad|guilty) about|shouldn't have)", Valence::Negative, Intensity::Low),
    emo("nostalgic", r"(miss the old days|used to love|those were the days)", Valence::Neutral, Intensity::Low),
    emo("hopeful", r"(things are looking up|feeling hopeful|better days)", Valence::Positive, Intensity::Medium),
    emo("relieved", r"\b(relieved|what a relief|glad that's over)\b", Valence::Positive, Intensity::Medium),
    emo("amused", r"(made me laugh|so funny|had a good laugh)", Valence::Positive, Intensity::Low),
    emo("irritable", r"(everything (bothers|annoys) me|short temper|cranky)", Valence::Negative, Intensity::Medium),

    // ── SAFETY ────────────────────────────────────────────────────────────
    sev(Category::Safety, "fall", r"\b(fell|fallen|took a (fall|tumble)|slipped)\b", Severity::High),
    sev(Category::Safety, "fall_fear", r"(afraid|scared|worried) .{0,20}fall", Severity::Medium),
    sev(Category::Safety, "cant_get_up", r"(can't|couldn't) get (up|out of)", Severity::High),
    sev(Category::Safety, "stranger", r"(stranger|someone I don't know) (at the door|called|knocking)", Severity::High),
    sev(Category::Safety, "scam", r"(scam|suspicious call|asked for my (bank|social security|card))", Severity::High),
    sev(Category::Safety, "smoke", r"(smell (smoke|gas)|burning smell)", Severity::High),
    sev(Category::Safety, "left_stove", r"(left|forgot) the (stove|oven|burner)", Severity::High),
    sev(Category::Safety, "door_unlocked", r"(door|window) (unlocked|open all night|won't lock)", Severity::Medium),
    sev(Category::Safety, "broken_equipment", r"(walker|cane|railing|stairlift) (broke|broken|wobbly)", Severity::Medium),
    sev(Category::Safety, "unsteady", r"\b(unsteady|wobbly|lost my balance)\b", Severity::Medium),
    sev(Category::Safety, "medication_mixup", r"(took the wrong|mixed up my) (pill|medication)", Severity::High),
    sev(Category::Safety, "wandering", r"(found myself (outside|somewhere)|didn't know how I got)", Severity::High),
    sev(Category::Safety, "driving_incident", r"(fender.bender|almost hit|scraped the car)", Severity::Medium),
    sev(Category::Safety, "bathroom_safety", r"(slippery|no grab bars?|tub is hard to)", Severity::Medium),
    sev(Category::Safety, "clutter", r"(tripp(ed|ing) (on|over)|cords? across|boxes everywhere)", Severity::Medium),
    sev(Category::Safety, "weapon", r"\b(gun|firearm|pistol)\b", Severity::High),

    // ── SOCIAL ────────────────────────────────────────────────────────────
    rule(Category::Social, "friend_visit", r"(friend|neighbor|neighbour).{0,25}(visited|came (by|over)|stopped (by|in))"),
    rule(Category::Social, "outing", r"(went|going) (out|to lunch|to dinner|shopping) with"),
    rule(Category::Social, "club", r"\b(bingo|bridge club|book club|senior center|church group|choir)\b"),
    rule(Category::Social, "phone_call", r"(talked|spoke|chatted) (to|with) .{0,20}(friend|neighbor|neighbour)"),
    rule(Category::Social, "isolation", r"(haven't (seen|talked to) anyone|nobody (comes|visits|calls))"),
    rule(Category::Social, "new_friend", r"(met someone|made a friend|new neighbor|new neighbour)"),
    rule(Category::Social, "volunteer", r"\b(volunteer(ing)?|helping out at)\b"),
    rule(Category::Social, "letter", r"(got|wrote|sent) a (letter|card) (from|to)"),
    rule(Category::Social, "neighborly_help", r"(neighbor|neighbour) .{0,25}(brought|helped|shoveled|mowed)"),
    rule(Category::Social, "community_event", r"(potluck|community (dinner|event)|street fair|farmers market)"),
    rule(Category::Social, "lost_friend", r"(friend|neighbor|neighbour) .{0,20}(passed|died|moved away)"),
    rule(Category::Social, "video_call", r"(video call|facetime|zoom(ed)? with)"),

    // ── ACTIVITY ──────────────────────────────────────────────────────────
    rule(Category::Activity, "gardening", r"\b(garden(ing)?|planted|flowers?|roses|tomatoes)\b"),
    rule(Category::Activity, "cooking", r"\b(cooked|cooking|baked|baking|recipe|made .{0,15}(soup|bread|pie|casserole))\b"),
    rule(Category::Activity, "walking", r"(went|going) for a walk|walked (to|around)"),
    rule(Category::Activity, "reading", r"\b(reading|finished (a|the|my) book|good book|novel)\b"),
    rule(Category::Activity, "tv", r"(watched|watching) .{0,15}(tv|television|show|movie|film)"),
    rule(Category::Activity, "crafts", r"\b(knitting|crochet(ing)?|quilting|sewing|puzzle|crossword)\b"),
    rule(Category::Activity, "music", r"(listening to|played?) .{0,15}(music|piano|radio|records)"),
    rule(Category::Activity, "exercise", r"\b(exercises?|stretching|chair yoga|physical therapy)\b"),
    rule(Category::Activity, "pets", r"\b(my (dog|cat|bird|pet)|took .{0,10}(dog|puppy) out)\b"),
    rule(Category::Activity, "cleaning", r"(cleaned|tidied|organized|organised) (up|the|my)"),
    rule(Category::Activity, "baking_for", r"(baking|made cookies|made a cake) for"),
    rule(Category::Activity, "birdwatching", r"(bird ?watch|feeder|hummingbirds?)"),
    rule(Category::Activity, "fishing", r"\b(fishing|went to the lake)\b"),
    rule(Category::Activity, "cards", r"\b(playing cards|solitaire|rummy|poker night)\b"),
    rule(Category::Activity, "painting", r"\b(painting|watercolors?|sketching|drawing)\b"),
    rule(Category::Activity, "shopping_trip", r"(went|going) (to the store|grocery shopping|to the mall)"),
    rule(Category::Activity, "church_activity", r"(church (bazaar|supper|picnic)|bible study)"),
    rule(Category::Activity, "napping", r"(had|took) a (little |nice )?nap"),

    // ── TIME REFERENCE ────────────────────────────────────────────────────
    rule(Category::TimeReference, "this_morning", r"\bthis morning\b"),
    rule(Category::TimeReference, "yesterday", r"\byesterday\b"),
    rule(Category::TimeReference, "tomorrow", r"\btomorrow\b"),
    rule(Category::TimeReference, "last_week", r"\blast (week|month|sunday|monday|tuesday|wednesday|thursday|friday|saturday)\b"),
    rule(Category::TimeReference, "next_week", r"\bnext (week|month|sunday|monday|tuesday|wednesday|thursday|friday|saturday)\b"),
    rule(Category::TimeReference, "weekend", r"\b(this|the|over the) weekend\b"),
    rule(Category::TimeReference, "holiday", r"\b(christmas|thanksgiving|easter|new year|fourth of july|holidays?)\b"),
    rule(Category::TimeReference, "long_ago", r"(years ago|back (then|when)|in my day|when I was young)"),
    rule(Category::TimeReference, "this_afternoon", r"\bthis (afternoon|evening)\b"),
    rule(Category::TimeReference, "tonight", r"\btonight\b"),
    rule(Category::TimeReference, "earlier_today", r"\bearlier (today|this morning)\b"),
    rule(Category::TimeReference, "specific_time", r"\bat (noon|midnight|\d{1,2}(:\d{2})? ?(am|pm|o'clock))\b"),
    rule(Category::TimeReference, "season", r"\b(this (spring|summer|fall|autumn|winter))\b"),
    rule(Category::TimeReference, "anniversary_date", r"(it's been|it will be) .{0,15}(years?|months?) since"),

    // ── ENVIRONMENT ───────────────────────────────────────────────────────
    rule(Category::Environment, "weather_nice", r"(beautiful|lovely|nice|sunny) (day|weather|morning|out)"),
    rule(Category::Environment, "weather_bad", r"(raining|snowing|storm|icy|freezing|too hot|heat wave)"),
    rule(Category::Environment, "house_cold", r"(house|apartment|room) is (cold|freezing|too hot)"),
    rule(Category::Environment, "repair_needed", r"(leak(ing)?|broken (furnace|heater|air condition)|power (went )?out)"),
    rule(Category::Environment, "noise", r"(noisy|too loud|construction|neighbors? .{0,15}loud)"),
    rule(Category::Environment, "garden_state", r"(yard|lawn|garden) (needs|is getting|overgrown)"),
    rule(Category::Environment, "critters", r"(mice|ants|squirrels? in|raccoons?|wasps?)"),
    rule(Category::Environment, "mail_delivery", r"(mail(man)?|package|delivery) (came|hasn't come|is late)"),
    rule(Category::Environment, "utilities", r"(water heater|plumbing|electric bill|gas bill)"),
    rule(Category::Environment, "seasonal_chores", r"(leaves to rake|snow to shovel|gutters)"),
    rule(Category::Environment, "dark_early", r"gets dark (so )?early"),

    // ── ADL (activities of daily living) ──────────────────────────────────
    sev(Category::Adl, "bathing", r"(trouble|hard|difficult|help) .{0,20}(bath(e|ing)?|shower(ing)?)", Severity::High),
    sev(Category::Adl, "dressing", r"(trouble|hard|difficult|can't) .{0,20}(dress(ing|ed)?|buttons)", Severity::High),
    sev(Category::Adl, "stairs", r"(stairs are|trouble with stairs|can't (climb|manage) .{0,10}stairs)", Severity::High),
    sev(Category::Adl, "cooking_difficulty", r"(can't|too hard to|stopped) cook(ing)?", Severity::Medium),
    sev(Category::Adl, "cleaning_difficulty", r"(can't keep up|too much) .{0,20}(house|cleaning|housework)", Severity::Medium),
    sev(Category::Adl, "shopping_difficulty", r"(can't|hard to|trouble) .{0,15}(shop|groceries|carry)", Severity::Medium),
    sev(Category::Adl, "mobility", r"(hard|trouble|difficult) .{0,15}(getting around|walking|moving)", Severity::High),
    sev(Category::Adl, "eating_difficulty", r"(trouble|hard) .{0,15}(chewing|swallowing|eating)", Severity::High),
    sev(Category::Adl, "medication_management", r"(pill (box|organizer)|hard to keep track of .{0,15}(pills|medications))", Severity::Medium),
    sev(Category::Adl, "laundry", r"(laundry (piles|is piling)|can't (do|manage) the laundry)", Severity::Medium),
    sev(Category::Adl, "opening_jars", r"(can't open|too weak to open) (jars?|bottles?|the lid)", Severity::Low),
    sev(Category::Adl, "bending", r"(can't (bend|reach|kneel)|hard to (bend|reach) down)", Severity::Medium),
    sev(Category::Adl, "phone_difficulty", r"(phone is too (complicated|hard)|can't work the (phone|remote|tv))", Severity::Low),
    sev(Category::Adl, "finances", r"(bills are (confusing|piling)|forgot to pay|checkbook)", Severity::Medium),

    // ── COGNITIVE ─────────────────────────────────────────────────────────
    sev(Category::Cognitive, "forgetting", r"(keep forgetting|so forgetful|memory is (going|bad|terrible))", Severity::High),
    sev(Category::Cognitive, "lost_track", r"(what day is it|lost track of (time|the day)|didn't know what day)", Severity::High),
    sev(Category::Cognitive, "misplacing", r"(can't find|misplaced|lost) my (keys|glasses|purse|wallet|phone)", Severity::Medium),
    sev(Category::Cognitive, "confusion", r"\b(confused|confusing|mixed up|muddled)\b", Severity::Medium),
    sev(Category::Cognitive, "repeating", r"(did I (already|just) (tell|say)|have I told you)", Severity::Medium),
    sev(Category::Cognitive, "word_finding", r"(can't think of the word|what's it called|the word escapes)", Severity::Medium),
    sev(Category::Cognitive, "got_lost", r"(got lost|couldn't (find|remember) (my|the) way)", Severity::High),
    sev(Category::Cognitive, "names", r"(can't remember names|forgot (his|her|their) name)", Severity::Medium),
    sev(Category::Cognitive, "appliance_confusion", r"(couldn't (work|figure out) the (microwave|oven|washer))", Severity::Medium),
    sev(Category::Cognitive, "time_confusion", r"(thought it was (monday|tuesday|wednesday|thursday|friday|saturday|sunday|morning|evening))", Severity::Medium),
    sev(Category::Cognitive, "double_dose", r"(took (it|them|my pills) twice|can't remember if I took)", Severity::High),
    sev(Category::Cognitive, "sharp_today", r"(sharp as a tack|memory('s| is) (fine|good))", Severity::Low),

    // ── HELP REQUEST ──────────────────────────────────────────────────────
    rule(Category::HelpRequest, "direct", r"(can you help|I need help|help me (with|figure))"),
    rule(Category::HelpRequest, "who_to_call", r"(who (should|do) I call|don't know who to (call|ask))"),
    rule(Category::HelpRequest, "how_to", r"(how do I|can you (tell|show) me how)"),
    rule(Category::HelpRequest, "caregiver", r"(tell|let) .{0,20}(my (son|daughter)|the nurse|caregiver) know"),
    rule(Category::HelpRequest, "errand", r"(need someone to|wish someone (would|could)) .{0,25}(pick up|drive|bring)"),
    rule(Category::HelpRequest, "tech_help", r"(help .{0,15}(with|setting up) (the|my) (tv|phone|computer|tablet))"),
    rule(Category::HelpRequest, "form_help", r"(help .{0,15}(filling out|with) (forms?|paperwork|insurance))"),
    rule(Category::HelpRequest, "reminder_request", r"(remind me (to|about)|don't let me forget)"),
    rule(Category::HelpRequest, "repeat_info", r"(write (that|it) down for me|tell me again)"),

    // ── END OF LIFE ───────────────────────────────────────────────────────
    sev(Category::EndOfLife, "suicidal", r"(want to (die|end it)|better off dead|(don'?t|do not|not) want to (live|be here|go on))", Severity::Critical),
    sev(Category::EndOfLife, "no_reason", r"(no reason to (go on|get up)|nothing left (for me|to live for))", Severity::Critical),
    sev(Category::EndOfLife, "burden", r"(burden (on|to) (everyone|my family)|better off without me)", Severity::Critical),
    sev(Category::EndOfLife, "mortality", r"(won't be (here|around) much longer|my time is (coming|near)|ready to go)", Severity::High),
    sev(Category::EndOfLife, "affairs", r"(getting my affairs in order|made? my will|funeral arrangements)", Severity::High),
    sev(Category::EndOfLife, "afterlife", r"(see .{0,15}(again )?(in heaven|on the other side)|joining (him|her|them) soon)", Severity::High),
    sev(Category::EndOfLife, "giving_away", r"(giving away my|who should have my|want you to have)", Severity::High),
    sev(Category::EndOfLife, "tired_of_living", r"(tired of (living|going on)|lived long enough)", Severity::Critical),
    sev(Category::EndOfLife, "hospice", r"\b(hospice|palliative)\b", Severity::High),

    // ── HYDRATION ─────────────────────────────────────────────────────────
    sev(Category::Hydration, "not_drinking", r"(haven't (had|drunk|been drinking)|forget to drink) .{0,15}water", Severity::High),
    sev(Category::Hydration, "thirsty", r"\b(so thirsty|dry mouth|parched)\b", Severity::High),
    sev(Category::Hydration, "dizzy_standing", r"dizzy when I (stand|get up)", Severity::High),
    sev(Category::Hydration, "dark_urine", r"(dark|hardly any) urine", Severity::High),
    sev(Category::Hydration, "drinking_well", r"(drinking (plenty|lots) of water|staying hydrated)", Severity::Low),
    sev(Category::Hydration, "coffee_only", r"(only (had|drunk) coffee|nothing but (coffee|tea))", Severity::Medium),
    sev(Category::Hydration, "headache_dry", r"(headachy? and (dry|thirsty))", Severity::High),
    sev(Category::Hydration, "forgot_to_eat_drink", r"forg(ot|etting) to (eat|drink)", Severity::High),
    sev(Category::Hydration, "cramping", r"(leg cramps?|muscle cramps?)", Severity::Medium),

    // ── TRANSPORTATION ────────────────────────────────────────────────────
    rule(Category::Transportation, "no_ride", r"(no (way|ride)|can't get) to (the|my) (store|doctor|church|appointment)"),
    rule(Category::Transportation, "stopped_driving", r"(stopped|gave up|shouldn't be) driving"),
    rule(Category::Transportation, "bus", r"\b(the bus|senior (van|shuttle)|paratransit)\b"),
    rule(Category::Transportation, "car_trouble", r"car (broke|won't start|in the shop)"),
    rule(Category::Transportation, "ride_offer", r"(gives? me (a ride|rides)|drives me|picked me up)"),
    rule(Category::Transportation, "license", r"(renew(ing)? my license|took (away )?(my|the) (keys|license))"),
    rule(Category::Transportation, "taxi", r"\b(taxi|uber|lyft|cab)\b"),
    rule(Category::Transportation, "walk_distance", r"(too far to walk|can't walk that far)"),
    rule(Category::Transportation, "night_driving", r"(don't|can't) drive (at night|in the dark|anymore)"),

    // ── NEWS ──────────────────────────────────────────────────────────────
    rule(Category::News, "watched_news", r"(saw|watched|heard) (it )?on the news"),
    rule(Category::News, "current_events", r"(election|president|government|prices? (going|are) up|inflation)"),
    rule(Category::News, "local_news", r"(in the (paper|newspaper)|around (here|town) they)"),
    rule(Category::News, "news_worry", r"news (is|has been) .{0,15}(scary|terrible|depressing)"),
    rule(Category::News, "sports", r"(the game|my team|playoffs?|world series|super bowl)"),
    rule(Category::News, "lottery", r"\b(lottery|powerball|scratch.?off)\b"),
    rule(Category::News, "celebrity", r"(that actor|that singer|on the tonight show)"),
    rule(Category::News, "weather_forecast", r"(they('re| are) (saying|calling for)|forecast says)"),

    // ── GOODBYE ───────────────────────────────────────────────────────────
    bye("goodbye", r"\b(good.?bye|bye.?bye)\b", Strength::Strong),
    bye("bye", r"\bbye\b", Strength::Strong),
    bye("talk_later", r"talk (to you|with you)? ?(later|soon|tomorrow|next week)", Strength::Strong),
    bye("gotta_go", r"((have|got)( to|ta) (go|run|get going)|I('d)? better (go|get going))", Strength::Strong),
    bye("hang_up_now", r"(hang(ing)? up now|going to let you go|let you go now)", Strength::Strong),
    bye("good_night", r"\bgood.?night\b", Strength::Strong),
    bye("thanks_for_calling", r"thank(s| you) for (calling|the call|checking (in|on me))", Strength::Weak),
    bye("wrapping", r"(before (I|you) go|one last thing|anyway\b.{0,10}$)", Strength::Weak),
    bye("take_care", r"\btake care\b", Strength::Weak),
    bye("see_you", r"\bsee you (later|soon|tomorrow|next time)\b", Strength::Strong),
    bye("so_long", r"\b(so long|farewell|toodle-?oo|ta-?ta)\b", Strength::Strong),
    bye("dinner_time", r"((my|the) (dinner|lunch|show|program) is (ready|on|starting)|someone('s| is) at the door)", Strength::Weak),
    bye("getting_tired", r"(getting (tired|sleepy)|about time for (my|a) nap)", Strength::Weak),

    // ── QUESTION ──────────────────────────────────────────────────────────
    rule(Category::Question, "about_donna", r"(how are you|what about you|and you)\??$"),
    rule(Category::Question, "what_time", r"what time is it"),
    rule(Category::Question, "weather_query", r"(what's|how's|what is) the weather"),
    rule(Category::Question, "simple", r"^(who|what|when|where|why|how|is|are|do|does|did|can|could|will|would)\b.{0,60}\?$"),
    rule(Category::Question, "repeat_request", r"(say (that|it) again|what did you say|pardon|come again)"),
    rule(Category::Question, "identity", r"(who (is this|am I talking to)|is this a (robot|machine|computer))"),
    rule(Category::Question, "when_call_again", r"(when (will|are) you call(ing)?|will you call (again|tomorrow))"),
    rule(Category::Question, "date_query", r"(what('s| is) (today's date|the date)|what day is it)"),
    rule(Category::Question, "opinion", r"(what do you think|do you (like|believe))"),
    rule(Category::Question, "remember_check", r"(do you remember|did I (ever )?tell you)"),

    // ── ENGAGEMENT ────────────────────────────────────────────────────────
    rule(Category::Engagement, "minimal", r"^(yes|no|yeah|yep|nope|ok|okay|fine|sure|mm-?hm+|uh-?huh|I guess|maybe)\.?$"),
    rule(Category::Engagement, "disinterest", r"(don't (care|know)|whatever|doesn't matter|if you say so)"),
    rule(Category::Engagement, "tired_of_talking", r"(tired of talking|don't feel like talking|not in the mood)"),
    rule(Category::Engagement, "enthusiastic", r"(oh.{0,5}(that's|how) (wonderful|lovely|interesting)|tell me more)"),
    rule(Category::Engagement, "trailing_off", r"(\.\.\.$|never mind|forget it|it's nothing)"),
    rule(Category::Engagement, "distracted", r"(hold on|just a (second|minute)|the tv is on)"),
    rule(Category::Engagement, "storytelling", r"(that reminds me|let me tell you|you won't believe)"),
    rule(Category::Engagement, "asking_back", r"(and (how are|what about) you|how('s| is) your day)"),

    // ── REMINDER ACKNOWLEDGMENT ───────────────────────────────────────────
    ack("already_done", r"(already (took|did|done|had)|took (it|them|those) (earlier|this morning|already))", 0.95),
    ack("just_did", r"just (took|did|finished) (it|them|that)", 0.95),
    ack("will_do", r"(I('ll| will) (do|take) (it|that|them)|will do|I'll get (right )?on it)", 0.85),
    ack("ok_reminder", r"^(ok(ay)?|all right|alright),? (I('ll| will)|thanks?)", 0.8),
    ack("promise", r"\bI promise\b", 0.85),
    ack("thanks_reminder", r"thank(s| you) for (remind(ing)?|the reminder)", 0.9),
    ack("on_it", r"(doing (it|that) (now|right now)|going to .{0,15}(take|do) .{0,10}now)", 0.9),
    ack("vague_yes", r"^(yes|yeah|yep|sure)\.?$", 0.6),
    ack("wrote_it_down", r"(wrote it down|put it on the calendar|made a note)", 0.9),
    ack("after_call", r"((right |soon )?after (we hang up|this call|we're done))", 0.85),
    ack("refusal", r"(don't need (it|them|that)|not (going to|gonna) take)", 0.75),
    ack("already_scheduled", r"(it's (already )?on (my|the) calendar|the appointment is set)", 0.85),
    ack("with_meal", r"((I'll )?take (it|them) with (breakfast|lunch|dinner|my meal))", 0.9),
];

/// A compiled rule-set. Build once per observer; `classify` is pure.
pub struct RuleSet {
    compiled: Vec<(Regex, &'static Rule)>,
}

impl RuleSet {
    pub fn compile() -> Self {
        let compiled = RULES
            .iter()
            .map(|r| {
                let re = Regex::new(&format!("(?i){}", r.pattern))
                    .unwrap_or_else(|e| panic!("bad rule pattern {:?}: {e}", r.signal));
                (re, r)
            })
            .collect();
        Self { compiled }
    }

    pub fn len(&self) -> usize {
        self.compiled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }

    /// Match a final transcript against every rule, folding hits into the
    /// typed signal bundle.
    pub fn classify(&self, transcript: &str) -> SignalBundle {
        let text = transcript.trim();
        let mut bundle = SignalBundle::default();
        for (re, rule) in &self.compiled {
            if re.is_match(text) {
                bundle.add(rule);
            }
        }
        bundle
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::compile()
    }
}
