diesel::table! {
    datasets (id) {
        id -> Uuid,
        owner_id -> Uuid,
        name -> Text,
        original_file_name -> Text,
        table_name -> Text,
        primary_key -> Text,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    use diesel::sql_types::{Bool, Int4, Nullable, Text, Uuid};

    dataset_columns (dataset_id, name) {
        dataset_id -> Uuid,
        name -> Text,
        data_type -> Text,
        is_nullable -> Bool,
        is_unique -> Bool,
        is_sensitive -> Bool,
        mask_pattern -> Nullable<Text>,
        ordinal -> Int4,
    }
}

diesel::table! {
    dataset_relations (id) {
        id -> Uuid,
        from_dataset_id -> Uuid,
        to_dataset_id -> Uuid,
        from_column -> Text,
        to_column -> Text,
        cardinality -> Text,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    import_logs (id) {
        id -> Uuid,
        owner_id -> Uuid,
        file_name -> Text,
        table_name -> Text,
        status -> Text,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    access_logs (id) {
        id -> Uuid,
        user_id -> Uuid,
        action -> Text,
        resource -> Text,
        details -> Nullable<Text>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    people (id) {
        id -> Uuid,
        owner_id -> Uuid,
        kind -> Text,
        name -> Text,
        document -> Text,
        email -> Nullable<Text>,
        phone -> Nullable<Text>,
        address -> Nullable<Text>,
        custom -> Nullable<Jsonb>,
        created_at -> Timestamptz,
        deleted_at -> Nullable<Timestamptz>,
    }
}

diesel::joinable!(dataset_columns -> datasets (dataset_id));

diesel::allow_tables_to_appear_in_same_query!(datasets, dataset_columns, dataset_relations,);
