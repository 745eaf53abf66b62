// SQLite schema definitions
// This file mirrors schema.rs; timestamps and JSON columns are stored as text

diesel::table! {
    categories (category_id) {
        category_id -> BigInt,
        name -> Text,
    }
}

diesel::table! {
    events (id) {
        id -> BigInt,
        start_time -> Text,
        end_time -> Text,
        start_time_local -> Text,
        end_time_local -> Text,
        timezone -> Text,
        longitude -> Nullable<Double>,
        latitude -> Nullable<Double>,
        title -> Text,
        description_text -> Nullable<Text>,
        description_html -> Nullable<Text>,
        url -> Nullable<Text>,
        logo -> Nullable<Text>,
        capacity -> Nullable<Integer>,
        is_free -> Bool,
        online_event -> Bool,
        category_id -> Nullable<BigInt>,
        attendees -> Text,
    }
}

diesel::joinable!(events -> categories (category_id));

diesel::allow_tables_to_appear_in_same_query!(categories, events);
