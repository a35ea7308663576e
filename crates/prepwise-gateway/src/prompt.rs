use crate::generate::GenerateParams;

/// Prompt asking the model for `amount` questions as a JSON array of strings.
pub fn build_question_prompt(params: &GenerateParams) -> String {
    format!(
        "Prepare questions for a job interview.
The job role is {role}.
The job experience level is {level}.
The tech stack used in the job is: {techstack}.
The focus between behavioural and technical questions should lean towards: {focus}.
The amount of questions required is: {amount}.
Please return only the questions, without any additional text.
The questions are going to be read by a voice assistant so do not use \"/\" or \"*\" or any other special characters which might break the voice assistant.
Return the questions formatted like this:
[\"Question 1\", \"Question 2\", \"Question 3\"]

Thank you! <3
",
        role = params.role,
        level = params.level,
        techstack = params.techstack,
        focus = params.interview_type,
        amount = params.amount,
    )
}
